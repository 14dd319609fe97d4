//! C ABI over [`MultiTapDelay`].
//!
//! Hosts that cannot call Rust methods drive a delay through flat `mt_delay_*` functions and an
//! opaque `u32` handle. Handles index a process-wide registry and are never reused, so calling
//! with a destroyed handle returns [`MT_ERR_INVALID_HANDLE`] instead of touching freed memory.
//! Handles count up from 1; once `u32::MAX - 1` handles have been issued, creation fails.
//!
//! [`mt_delay_process`] never blocks: when the registry or the instance is busy the block is
//! copied through unprocessed and [`MT_BYPASSED`] is returned. An instance is always freed on
//! the thread calling [`mt_delay_destroy`], which waits for any block in flight.
//!
//! Every instance is split with [`crate::control::split`]: setters validate and queue their
//! change, [`mt_delay_process`] applies queued changes at the start of the next block. Getters
//! report the last accepted settings. Setters and getters may be called from any thread while
//! another thread processes.
//!
//! Functions return a status code (`0` on success, negative on failure). Getters write through
//! an out pointer.

use std::collections::HashMap;
use std::ffi::{c_int, c_void};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};

use crate::control::{split, DelayController, EffectProcessor, DEFAULT_QUEUE_CAPACITY};
use crate::delay::MultiTapDelay;
use crate::effect::Effect;
use crate::error::{EngineError, EngineResult};

// ==========================================
// Status Codes
// ==========================================

pub const MT_OK : c_int = 0;
/// The block was copied through unprocessed because the instance was busy.
pub const MT_BYPASSED : c_int = 1;
/// The handle was never created or has been destroyed.
pub const MT_ERR_INVALID_HANDLE : c_int = -1;
/// A required pointer was null, a list was empty, or a count was negative.
pub const MT_ERR_INVALID_ARGUMENT : c_int = -2;
/// The configuration change was rejected; previous settings are kept.
pub const MT_ERR_REJECTED : c_int = -3;
/// Too many changes queued since the last processed block.
pub const MT_ERR_QUEUE_FULL : c_int = -4;
/// The call does not fit the current state, for example when no handle is left to issue.
pub const MT_ERR_INVALID_USE : c_int = -5;

/// Status code reported for `error`.
pub fn status_code(error : &EngineError) -> c_int
{
    match error
    {
        EngineError::InvalidHandle(_) => MT_ERR_INVALID_HANDLE,
        EngineError::NullPointer(_) => MT_ERR_INVALID_ARGUMENT,
        EngineError::QueueFull => MT_ERR_QUEUE_FULL,
        EngineError::InvalidUse(_) => MT_ERR_INVALID_USE,
        _ => MT_ERR_REJECTED,
    }
}

fn status(result : EngineResult<()>) -> c_int
{
    match result
    {
        Ok(()) => MT_OK,
        Err(error) => status_code(&error),
    }
}

// ==========================================
// Registry
// ==========================================

struct Instance
{
    processor : Mutex<EffectProcessor<MultiTapDelay>>,
    controller : Mutex<DelayController>
}

static INSTANCES : LazyLock<RwLock<HashMap<u32, Arc<Instance>>>> = LazyLock::new(|| RwLock::new(HashMap::new()));
static NEXT_HANDLE : AtomicU32 = AtomicU32::new(1);

/// Takes the next handle from `counter`. `None` once the counter reached `u32::MAX`, so 0 is
/// never issued and no handle is issued twice.
fn next_handle(counter : &AtomicU32) -> Option<u32>
{
    return counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| next.checked_add(1)).ok();
}

fn register(delay : MultiTapDelay) -> EngineResult<u32>
{
    let Some(handle) = next_handle(&NEXT_HANDLE) else
    {
        log::error!("Delay handles exhausted");
        return Err(EngineError::InvalidUse("no delay handles left"));
    };
    let (processor, controller) = split(delay, DEFAULT_QUEUE_CAPACITY);
    let instance = Arc::new(Instance { processor : Mutex::new(processor), controller : Mutex::new(controller) });
    INSTANCES.write().insert(handle, instance);
    log::debug!("Created delay handle {}", handle);
    return Ok(handle);
}

fn instance(handle : u32) -> EngineResult<Arc<Instance>>
{
    INSTANCES.read().get(&handle).cloned().ok_or_else(||
    {
        log::warn!("Call with invalid delay handle {}", handle);
        EngineError::InvalidHandle(handle)
    })
}

fn control(handle : u32, change : impl FnOnce(&mut DelayController) -> EngineResult<()>) -> c_int
{
    status(instance(handle).and_then(|instance| change(&mut *instance.controller.lock())))
}

/// Writes a controller reading through `out`.
///
/// # Safety
/// `out` must be null or valid for a write of `T`.
unsafe fn query<T>(handle : u32, out : *mut T, read : impl FnOnce(&DelayController) -> T) -> c_int
{
    if out.is_null() { return status(Err(EngineError::NullPointer("out"))); }
    match instance(handle)
    {
        Ok(instance) =>
        {
            let value = read(&*instance.controller.lock());
            unsafe { out.write(value); }
            MT_OK
        }
        Err(error) => status_code(&error)
    }
}

// ==========================================
// Lifecycle
// ==========================================

/// Create a delay with a single 200 ms tap. Returns 0 only when no handle is left.
#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_init() -> u32 { return register(MultiTapDelay::new()).unwrap_or(0); }

/// Create a delay from `len` tap delays in milliseconds and write its handle to `handle_out`.
///
/// # Safety
/// `delays_ms` must point to `len` readable floats (or be null with `len == 0`).
/// `handle_out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_create_with_taps(delays_ms : *const f32, len : usize, handle_out : *mut u32) -> c_int
{
    if handle_out.is_null() || (delays_ms.is_null() && len > 0) { return MT_ERR_INVALID_ARGUMENT; }
    let delays : &[f32] = if len == 0 { &[] } else { unsafe { std::slice::from_raw_parts(delays_ms, len) } };
    match MultiTapDelay::from_millis(delays)
    {
        Ok(delay) => match register(delay)
        {
            Ok(handle) =>
            {
                unsafe { handle_out.write(handle); }
                MT_OK
            }
            Err(error) => status_code(&error)
        },
        Err(error) =>
        {
            log::warn!("Rejected delay taps: {}", error);
            status_code(&error)
        }
    }
}

/// Destroy a delay. Destroying twice returns [`MT_ERR_INVALID_HANDLE`].
///
/// Waits until no other call holds the instance, so its memory is released here and never on
/// the audio thread.
#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_destroy(handle : u32) -> c_int
{
    let removed = INSTANCES.write().remove(&handle);
    let Some(mut instance) = removed else { return status_code(&EngineError::InvalidHandle(handle)); };
    // Nothing can clone the instance once it left the registry.
    loop
    {
        match Arc::try_unwrap(instance)
        {
            Ok(owned) => { drop(owned); break; }
            Err(shared) => { instance = shared; std::thread::yield_now(); }
        }
    }
    log::debug!("Destroyed delay handle {}", handle);
    return MT_OK;
}

// ==========================================
// Processing
// ==========================================

/// Copies `frames` samples from `input` to `output`, which may overlap.
///
/// # Safety
/// `input` must be readable and `output` writable for `frames` floats.
unsafe fn bypass(input : *const f32, output : *mut f32, frames : usize)
{
    if !std::ptr::eq(input, output) { unsafe { std::ptr::copy(input, output, frames); } }
}

/// Process `frames` samples. `input` and `output` may be the same buffer.
///
/// Never blocks or frees memory. Returns [`MT_BYPASSED`] after copying `input` to `output`
/// when the registry or the instance is busy.
///
/// # Safety
/// `input` must be readable and `output` writable for `frames` floats.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_process(handle : u32, input : *const f32, output : *mut f32, frames : c_int) -> c_int
{
    if input.is_null() || output.is_null() || frames < 0 { return MT_ERR_INVALID_ARGUMENT; }
    let frames = frames as usize;
    let instance = match INSTANCES.try_read()
    {
        Some(instances) => match instances.get(&handle)
        {
            Some(instance) => Arc::clone(instance),
            None => return MT_ERR_INVALID_HANDLE
        },
        None =>
        {
            unsafe { bypass(input, output, frames); }
            return MT_BYPASSED;
        }
    };
    let Some(mut processor) = instance.processor.try_lock() else
    {
        unsafe { bypass(input, output, frames); }
        return MT_BYPASSED;
    };
    if std::ptr::eq(input, output)
    {
        let buffer = unsafe { std::slice::from_raw_parts_mut(output, frames) };
        processor.process_in_place(buffer);
    }
    else
    {
        let input = unsafe { std::slice::from_raw_parts(input, frames) };
        let output = unsafe { std::slice::from_raw_parts_mut(output, frames) };
        processor.process(input, output);
    }
    MT_OK
}

/// Forget history before the next processed block.
#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_reset(handle : u32) -> c_int { control(handle, |controller| controller.reset()) }

/// Filter callback signature used by hosts that pull audio through a filter hook.
pub type FilterCallback = unsafe extern "C" fn(input : *const f32, output : *mut f32, frames : c_int, user_data : *mut c_void);

/// Filter hook processing through the delay whose handle is carried in `user_data`.
///
/// Always fills `output`: when the handle is invalid the input is copied through.
///
/// # Safety
/// Same as [`mt_delay_process`]. `user_data` holds the handle value, not a pointer.
pub unsafe extern "C" fn mt_delay_filter(input : *const f32, output : *mut f32, frames : c_int, user_data : *mut c_void)
{
    let handle = user_data as usize as u32;
    let status = unsafe { mt_delay_process(handle, input, output, frames) };
    // The host plays whatever is in `output`, so a failed block passes the input through.
    if status < 0 && !input.is_null() && !output.is_null() && frames > 0
    {
        unsafe { bypass(input, output, frames as usize); }
    }
}

/// Returns [`mt_delay_filter`] for registration with a host player.
#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_get_audio_file_filter_callback() -> FilterCallback { mt_delay_filter }

// ==========================================
// Parameters
// ==========================================

#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_set_frequency(handle : u32, frequency : f32) -> c_int
{
    control(handle, |controller| controller.set_frequency(frequency))
}

/// # Safety
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_get_frequency(handle : u32, out : *mut f32) -> c_int
{
    unsafe { query(handle, out, |controller| controller.frequency()) }
}

/// Spread `count` taps evenly over `total_delay_ms`.
#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_set_taps(handle : u32, count : c_int, total_delay_ms : f32) -> c_int
{
    if count < 0 { return MT_ERR_INVALID_ARGUMENT; }
    control(handle, |controller| controller.set_taps(count as usize, total_delay_ms))
}

/// Replace the taps with `len` delays in milliseconds.
///
/// A null or empty list returns [`MT_ERR_INVALID_ARGUMENT`] and keeps the current taps.
///
/// # Safety
/// `delays_ms` must be null or point to `len` readable floats.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_set_tap_delays(handle : u32, delays_ms : *const f32, len : usize) -> c_int
{
    if delays_ms.is_null() || len == 0
    {
        log::warn!("Rejected empty tap list for delay handle {}", handle);
        return MT_ERR_INVALID_ARGUMENT;
    }
    let delays = unsafe { std::slice::from_raw_parts(delays_ms, len) };
    return control(handle, |controller| controller.set_tap_delays_ms(delays));
}

/// # Safety
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_get_tap_number(handle : u32, out : *mut c_int) -> c_int
{
    unsafe { query(handle, out, |controller| controller.tap_count() as c_int) }
}

/// # Safety
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_get_max_delay_in_milliseconds(handle : u32, out : *mut f32) -> c_int
{
    unsafe { query(handle, out, |controller| controller.max_tap_delay_ms()) }
}

/// Set the wet/dry mix.
#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_set_wet(handle : u32, wet : f32) -> c_int { control(handle, |controller| controller.set_mix(wet)) }

/// # Safety
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_get_wet(handle : u32, out : *mut f32) -> c_int
{
    unsafe { query(handle, out, |controller| controller.mix()) }
}

#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_set_wet_gain(handle : u32, wet_gain : f32) -> c_int
{
    control(handle, |controller| controller.set_wet_gain(wet_gain))
}

/// # Safety
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_get_wet_gain(handle : u32, out : *mut f32) -> c_int
{
    unsafe { query(handle, out, |controller| controller.wet_gain()) }
}

#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_set_enabled(handle : u32, enabled : c_int) -> c_int
{
    control(handle, |controller| controller.set_enabled(enabled != 0))
}

/// # Safety
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_get_enabled(handle : u32, out : *mut c_int) -> c_int
{
    unsafe { query(handle, out, |controller| controller.is_enabled() as c_int) }
}

/// Set the per-tap attenuation, clamped to `0.25..=1.0`.
#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_set_attenuation(handle : u32, attenuation : f32) -> c_int
{
    control(handle, |controller| controller.set_attenuation(attenuation))
}

/// # Safety
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_get_attenuation(handle : u32, out : *mut f32) -> c_int
{
    unsafe { query(handle, out, |controller| controller.attenuation()) }
}

#[unsafe(no_mangle)]
pub extern "C" fn mt_delay_set_enable_compressor(handle : u32, enabled : c_int) -> c_int
{
    control(handle, |controller| controller.set_compressor_enabled(enabled != 0))
}

/// # Safety
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mt_delay_is_compressor_enabled(handle : u32, out : *mut c_int) -> c_int
{
    unsafe { query(handle, out, |controller| controller.is_compressor_enabled() as c_int) }
}
