///Circular history buffer. The write head returns to 0 when it meets the capacity of the buffer.
///
///Storage is allocated once in `new` and never resized, so `push` and `delayed` are safe to call
///from an audio callback. `filled` counts how many pushed samples are still held and saturates at
///the capacity; `reset` only clears that count, the stale samples stay in memory but are never
///reachable through `delayed` until they are overwritten.
#[derive(Clone)]
pub struct CircularBuffer<T>
{
    buffer : Box<[T]>,
    head : usize,
    filled : usize
}
impl<T : Copy + Default> CircularBuffer<T>
{
    ///New CircularBuffer with capacity. A capacity of 0 is raised to 1.
    pub fn new(capacity : usize) -> Self
    {
        Self { buffer : vec![T::default(); capacity.max(1)].into_boxed_slice(), head : 0, filled : 0 }
    }
    ///Pushes data to buffer and advances the write head.
    #[inline]
    pub fn push(&mut self, value : T)
    {
        self.buffer[self.head] = value;
        self.head += 1;
        if self.head == self.buffer.len() { self.head = 0; }
        if self.filled < self.buffer.len() { self.filled += 1; }
    }
    ///Returns the sample pushed `offset` pushes ago, or `None` when that much history is not held.
    ///`offset` 1 is the most recent sample, `offset == capacity` the oldest one.
    #[inline]
    pub fn delayed(&self, offset : usize) -> Option<T>
    {
        if offset == 0 || offset > self.filled { return None; }
        let len = self.buffer.len();
        Some(self.buffer[(self.head + len - offset) % len])
    }
    ///Forgets all history without touching the stored samples.
    #[inline]
    pub fn reset(&mut self) { self.filled = 0; }
    ///Index where the next sample will be written.
    #[inline]
    pub fn head(&self) -> usize { return self.head; }
    ///Number of valid samples currently held.
    #[inline]
    pub fn filled(&self) -> usize { return self.filled; }
    ///Returns the capacity of the buffer.
    #[inline]
    pub fn capacity(&self) -> usize { return self.buffer.len(); }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn reads_back_in_fifo_order()
    {
        let mut buffer = CircularBuffer::<f32>::new(10);
        for i in 1..=5 { buffer.push(i as f32); }

        assert_eq!(buffer.delayed(1), Some(5.0));
        assert_eq!(buffer.delayed(2), Some(4.0));
        assert_eq!(buffer.delayed(5), Some(1.0));
        assert_eq!(buffer.delayed(6), None);
        assert_eq!(buffer.filled(), 5);
    }

    #[test]
    fn wraps_and_saturates()
    {
        let mut buffer = CircularBuffer::<f32>::new(4);
        for i in 0..6 { buffer.push(i as f32); }

        // Holds [4, 5, 2, 3], head at 2.
        assert_eq!(buffer.head(), 2);
        assert_eq!(buffer.filled(), 4);
        assert_eq!(buffer.delayed(1), Some(5.0));
        assert_eq!(buffer.delayed(4), Some(2.0));
        assert_eq!(buffer.delayed(5), None);
    }

    #[test]
    fn offset_zero_is_never_history()
    {
        let mut buffer = CircularBuffer::<f32>::new(4);
        buffer.push(1.0);
        assert_eq!(buffer.delayed(0), None);
    }

    #[test]
    fn reset_masks_stale_samples()
    {
        let mut buffer = CircularBuffer::<f32>::new(8);
        for _ in 0..8 { buffer.push(0.75); }
        let head = buffer.head();
        buffer.reset();

        assert_eq!(buffer.filled(), 0);
        assert_eq!(buffer.head(), head);
        assert_eq!(buffer.delayed(1), None);

        buffer.push(0.25);
        assert_eq!(buffer.delayed(1), Some(0.25));
        assert_eq!(buffer.delayed(2), None);
    }

    #[test]
    fn zero_capacity_is_raised()
    {
        let mut buffer = CircularBuffer::<f32>::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(3.0);
        buffer.push(4.0);
        assert_eq!(buffer.delayed(1), Some(4.0));
    }
}
