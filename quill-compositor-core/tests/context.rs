mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{FakeSupervisor, SERVICE};
use pretty_assertions::assert_eq;
use quill_buffer_manager::PixelFormat;
use quill_compositor_core::{
    CompositorContext, DirtyMode, SimulatedDriver, SystemClock, UpdateMode, WaveformMode,
};
use quill_core::config::CoreConfig;
use quill_core::types::Rect;

fn start(driver: &Arc<SimulatedDriver>) -> CompositorContext {
    CompositorContext::start_with_driver(
        &CoreConfig::default(),
        driver.clone(),
        Arc::new(FakeSupervisor::default()),
        Arc::new(SystemClock),
        SERVICE,
    )
    .unwrap()
}

#[test]
fn startup_clears_the_screen() {
    let driver = Arc::new(SimulatedDriver::new(48, 32, PixelFormat::Rgb16).unwrap());
    let context = start(&driver);

    let deadline = Instant::now() + Duration::from_secs(5);
    while driver.waits().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let updates = driver.updates();
    let waveforms: Vec<WaveformMode> = updates.iter().map(|u| u.waveform).collect();
    assert_eq!(
        waveforms,
        vec![WaveformMode::Initialize, WaveformMode::HighQualityGrayscale]
    );
    assert!(updates.iter().all(|u| u.mode == UpdateMode::Full));
    assert_eq!(driver.waits(), vec![updates[1].marker]);
    context.shutdown();
}

#[test]
fn synchronous_repaint_returns_after_display() {
    let driver = Arc::new(SimulatedDriver::new(48, 32, PixelFormat::Rgb16).unwrap());
    let context = start(&driver);
    let registry = context.registry();
    let window = registry
        .create_system_window(Some(Rect::new(0, 0, 16, 16)), PixelFormat::Rgb16)
        .unwrap();

    registry.dirty(
        Some(Arc::clone(&window)),
        Rect::new(0, 0, 16, 16),
        Some(WaveformMode::Mono),
        0,
        DirtyMode::Sync,
    );

    // Showing the window queued an automatic repaint of the same area first.
    let painted = driver
        .updates()
        .into_iter()
        .rev()
        .find(|u| u.rect == Rect::new(0, 0, 16, 16) && u.waveform == WaveformMode::Mono)
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !driver.waits().contains(&painted.marker) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(driver.waits().contains(&painted.marker));

    context.shutdown();
    context.shutdown();
}

#[test]
fn waits_resolve_after_shutdown() {
    let driver = Arc::new(SimulatedDriver::new(16, 16, PixelFormat::Rgb16).unwrap());
    let context = start(&driver);
    let window = context
        .registry()
        .create_system_window(None, PixelFormat::Rgb16)
        .unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    window.wait_for_marker(
        SERVICE,
        41,
        Box::new(move || {
            let _ = tx.send(());
        }),
    );
    context.shutdown();
    assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());

    let (tx, rx) = std::sync::mpsc::channel();
    window.wait_for_marker(
        SERVICE,
        42,
        Box::new(move || {
            let _ = tx.send(());
        }),
    );
    assert!(rx.try_recv().is_ok());
}
