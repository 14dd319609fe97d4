use std::sync::Arc;

use parking_lot::Mutex;

use multitap::control::split;
use multitap::delay::MultiTapDelay;
use multitap::player::{MemorySource, PlaybackStatus, Player, PlayerState};
use multitap::realtime::{CallbackResult, Realtime};

fn init_logging()
{
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_offline_render_through_controlled_filter()
{
    init_logging();
    let mut source = vec![0.0f32; 2000];
    source[0] = 1.0;
    let mut player = Player::new(Box::new(MemorySource::new(source, 1000.0)));

    let (processor, mut controller) = split(MultiTapDelay::new(), 16);
    player.register_filter(Box::new(processor)).unwrap();
    controller.set_frequency(1000.0).unwrap();
    controller.set_tap_delays_ms(&[250.0, 500.0]).unwrap();
    controller.set_mix(1.0).unwrap();
    controller.set_wet_gain(1.0).unwrap();

    let transport = player.transport();
    transport.start().unwrap();

    let mut rendered = Vec::new();
    let mut block = [0.0f32; 128];
    loop
    {
        let status = player.render(&mut block);
        rendered.extend_from_slice(&block);
        if status == PlaybackStatus::Finished { break; }
    }

    assert_eq!(transport.state(), PlayerState::Stopped);
    assert_eq!(transport.played_samples(), 2000);
    assert!((rendered[250] - 1.0).abs() < 1e-6, "expected first echo at 250, got {}", rendered[250]);
    assert!((rendered[500] - 0.5).abs() < 1e-6, "expected second echo at 500, got {}", rendered[500]);
    assert_eq!(rendered.iter().filter(|&&sample| sample != 0.0).count(), 2);
}

#[test]
fn test_player_drives_stream_until_source_ends()
{
    init_logging();
    let mut player = Player::new(Box::new(MemorySource::new(vec![0.5; 4096], 48000.0)));
    player.register_filter(Box::new(MultiTapDelay::new())).unwrap();
    let transport = player.transport();
    transport.start().unwrap();

    let peak = Arc::new(Mutex::new(0.0f32));
    let stream_peak = Arc::clone(&peak);
    let mut render = player.into_callback();

    let mut audio = Realtime::new().with_pacing(false);
    audio.open_stream(48000, 512, Box::new(move |output, time|
    {
        let result = render(&mut *output, time);
        let block_peak = output.iter().fold(0.0f32, |peak, sample| peak.max(sample.abs()));
        let mut peak = stream_peak.lock();
        *peak = peak.max(block_peak);
        result
    })).unwrap();

    audio.start_stream().unwrap();
    while audio.is_stream_running() { std::thread::yield_now(); }
    audio.stop_stream().unwrap();

    // 4096 samples in 512-sample blocks; the block after the last one finds the source empty.
    assert_eq!(audio.get_stream_frames(), 4608);
    assert_eq!(transport.state(), PlayerState::Stopped);
    assert!(*peak.lock() > 0.0);
    assert!(*peak.lock() <= 1.0);
    audio.close_stream();
}
