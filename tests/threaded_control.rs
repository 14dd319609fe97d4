use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use multitap::control::split;
use multitap::delay::MultiTapDelay;
use multitap::effect::Effect;
use multitap::EngineError;

#[test]
fn test_changes_from_control_thread_land_between_blocks()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let delay = MultiTapDelay::from_millis(&[10.0, 20.0, 30.0]).unwrap();
    let (mut processor, mut controller) = split(delay, 32);
    controller.set_frequency(1000.0).unwrap();
    controller.set_mix(1.0).unwrap();
    controller.set_wet_gain(1.0).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let audio_done = Arc::clone(&done);
    let audio = std::thread::spawn(move ||
    {
        let mut block = vec![0.0f32; 64];
        while !audio_done.load(Ordering::Acquire)
        {
            block.fill(0.1);
            processor.process_in_place(&mut block);
            assert!(block.iter().all(|sample| sample.is_finite()), "block produced a non-finite sample");
            std::thread::yield_now();
        }
        processor.process_in_place(&mut block);
        processor
    });

    for step in 0..200
    {
        let result = match step % 4
        {
            0 => controller.set_taps(1 + step % 7, 400.0),
            1 => controller.set_attenuation(0.25 + (step % 3) as f32 * 0.25),
            2 => controller.set_compressor_enabled(step % 8 == 2),
            _ => controller.set_frequency(if step % 8 == 3 { 48000.0 } else { 1000.0 }),
        };
        match result
        {
            Ok(()) | Err(EngineError::QueueFull) => {}
            Err(error) => panic!("unexpected rejection at step {}: {}", step, error),
        }
    }
    done.store(true, Ordering::Release);
    let processor = audio.join().unwrap();

    assert_eq!(controller.pending(), 0);
    assert_eq!(controller.stats().rejected(), 0);
    assert_eq!(&processor.effect().config(), controller.config());
}
