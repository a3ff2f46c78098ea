mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{Harness, OWNER, SERVICE};
use pretty_assertions::assert_eq;
use quill_buffer_manager::{Color, PixelFormat};
use quill_compositor_core::{
    DirtyMode, DisplayDriver, UpdateMode, WaveformMode, WindowEvent, WindowState,
};
use quill_core::types::Rect;

#[test]
fn occluded_parts_of_a_window_are_not_repainted() {
    let h = Harness::new(200, 200);
    let a = h
        .registry
        .create_window(OWNER, Some(Rect::new(0, 0, 100, 100)), PixelFormat::Rgb16)
        .unwrap();
    let b = h
        .registry
        .create_window(OWNER, Some(Rect::new(50, 50, 100, 100)), PixelFormat::Rgb16)
        .unwrap();
    let c = h
        .registry
        .create_window(OWNER, Some(Rect::default()), PixelFormat::Rgb16)
        .unwrap();
    for window in [&a, &b, &c] {
        window.set_visible(OWNER, true);
        window.raise(OWNER);
    }
    assert_eq!((a.z(), b.z(), c.z()), (0, 1, 2));
    assert!(!c.visible());
    h.flush();
    h.driver.clear_history();

    a.repaint(OWNER, None, Some(WaveformMode::Mono), 7);
    h.flush();

    let rects: Vec<Rect> = h.driver.updates().iter().map(|u| u.rect).collect();
    assert_eq!(rects, vec![Rect::new(0, 0, 100, 50), Rect::new(0, 50, 50, 50)]);
}

#[test]
fn repaint_at_extreme_coordinates_is_dropped() {
    let h = Harness::new(100, 100);
    let window = h
        .registry
        .create_window(OWNER, Some(Rect::new(10, 10, 50, 50)), PixelFormat::Rgb16)
        .unwrap();
    window.set_visible(OWNER, true);
    h.flush();
    h.driver.clear_history();

    window.handle_message(WindowEvent::Repaint {
        x: i32::MAX,
        y: 0,
        width: 10,
        height: 10,
        waveform: 0,
        marker: 9,
    });
    h.flush();
    assert!(h.driver.updates().is_empty());
    let record = h
        .correlator
        .completed_records()
        .into_iter()
        .find(|r| r.marker == 9)
        .unwrap();
    assert_eq!(record.hardware_marker, 0);

    // The compositor keeps working afterwards.
    window.repaint(OWNER, None, Some(WaveformMode::Mono), 10);
    h.flush();
    let rects: Vec<Rect> = h.driver.updates().iter().map(|u| u.rect).collect();
    assert_eq!(rects, vec![Rect::new(10, 10, 50, 50)]);
}

#[test]
fn fully_occluded_repaint_sends_nothing() {
    let h = Harness::new(200, 200);
    let below = h
        .registry
        .create_window(OWNER, Some(Rect::new(10, 10, 20, 20)), PixelFormat::Rgb16)
        .unwrap();
    let above = h
        .registry
        .create_window(OWNER, Some(Rect::new(0, 0, 50, 50)), PixelFormat::Rgb16)
        .unwrap();
    below.set_visible(OWNER, true);
    above.set_visible(OWNER, true);
    above.raise(OWNER);
    h.flush();
    h.driver.clear_history();

    below.repaint(OWNER, None, None, 3);
    h.flush();
    assert!(h.driver.updates().is_empty());
    let record = h
        .correlator
        .completed_records()
        .into_iter()
        .find(|r| r.marker == 3)
        .unwrap();
    assert_eq!(record.hardware_marker, 0);
}

#[test]
fn hidden_window_repaint_issues_no_hardware_call() {
    let h = Harness::new(100, 100);
    let window = h.registry.create_window(OWNER, None, PixelFormat::Rgb16).unwrap();
    window.raise(OWNER);
    assert_eq!(window.state(), WindowState::RaisedHidden);
    h.flush();
    h.driver.clear_history();

    window.repaint(OWNER, None, None, 5);
    assert_eq!(h.compositor.queued(), 0);
    h.flush();

    assert!(h.driver.updates().is_empty());
    assert!(h.driver.waits().is_empty());
    let record = h
        .correlator
        .completed_records()
        .into_iter()
        .find(|r| r.marker == 5 && r.window == Some(window.id()))
        .unwrap();
    assert_eq!(record.hardware_marker, 0);
    assert!(!record.waited);

    let resolved = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&resolved);
    window.wait_for_marker(
        OWNER,
        5,
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(resolved.load(Ordering::SeqCst), 1);
}

#[test]
fn full_screen_repaint_uses_full_update() {
    let h = Harness::new(64, 32);
    let window = h.registry.create_window(OWNER, None, PixelFormat::Rgb16).unwrap();
    window.set_visible(OWNER, true);
    h.flush();
    h.driver.clear_history();

    window.repaint(OWNER, None, Some(WaveformMode::Mono), 1);
    h.flush();
    let updates = h.driver.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].rect, Rect::new(0, 0, 64, 32));
    assert_eq!(updates[0].mode, UpdateMode::Full);
    assert_eq!(updates[0].temperature, 0x18);
    assert_ne!(updates[0].marker, 0);
}

#[test]
fn waveform_is_chosen_from_painted_pixels() {
    let h = Harness::new(64, 64);
    let window = h
        .registry
        .create_window(OWNER, Some(Rect::new(8, 8, 16, 16)), PixelFormat::Rgb16)
        .unwrap();
    window.set_visible(OWNER, true);
    h.flush();
    h.driver.clear_history();

    window.buffer().unwrap().fill(Color::GRAY);
    window.repaint(OWNER, None, None, 2);
    h.flush();

    let updates = h.driver.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].rect, Rect::new(8, 8, 16, 16));
    assert_eq!(updates[0].mode, UpdateMode::Partial);
    assert_eq!(updates[0].waveform, WaveformMode::Grayscale);
    assert_eq!(
        h.driver.framebuffer().pixel(8, 8),
        Some(PixelFormat::Rgb16.quantize(Color::GRAY))
    );
}

#[test]
fn global_repaint_paints_background_then_windows() {
    let h = Harness::new(40, 40);
    let window = h
        .registry
        .create_window(OWNER, Some(Rect::new(0, 0, 20, 20)), PixelFormat::Rgb16)
        .unwrap();
    window.buffer().unwrap().fill(Color::BLACK);
    window.set_visible(OWNER, true);
    h.driver.framebuffer().fill(Color::GRAY);

    h.registry.dirty(
        None,
        Rect::new(0, 0, 40, 40),
        None,
        0,
        DirtyMode::Async,
    );
    h.flush();

    let fb = h.driver.framebuffer();
    assert_eq!(fb.pixel(5, 5), Some(Color::BLACK));
    assert_eq!(fb.pixel(30, 30), Some(Color::WHITE));
}

#[test]
fn driver_failure_resolves_marker_without_hardware() {
    let h = Harness::new(32, 32);
    let window = h.registry.create_window(OWNER, None, PixelFormat::Rgb16).unwrap();
    window.set_visible(OWNER, true);
    h.flush();
    h.driver.set_fail_updates(true);

    window.repaint(OWNER, None, None, 9);
    h.flush();
    let record = h
        .correlator
        .completed_records()
        .into_iter()
        .find(|r| r.marker == 9)
        .unwrap();
    assert_eq!(record.hardware_marker, 0);
}

#[test]
fn vanished_process_group_drops_window_from_stack() {
    let h = Harness::new(32, 32);
    let window = h.registry.create_window(OWNER, None, PixelFormat::Rgb16).unwrap();
    let system = h.registry.create_system_window(None, PixelFormat::Rgb16).unwrap();
    window.set_visible(OWNER, true);
    h.supervisor.gone.lock().insert(OWNER);
    h.supervisor.gone.lock().insert(SERVICE);

    let stack = h.compositor.visible_stack();
    assert_eq!(stack.len(), 1);
    assert!(Arc::ptr_eq(&stack[0], &system));
}

#[test]
fn closed_window_is_released_once_no_wait_refers_to_it() {
    let h = Harness::new(32, 32);
    let window = h.registry.create_window(OWNER, None, PixelFormat::Rgb16).unwrap();
    window.set_visible(OWNER, true);
    h.flush();

    window.wait_for_marker(OWNER, 99, Box::new(|| {}));
    window.close(OWNER);
    assert_eq!(h.registry.window_count(), 0);
    assert_eq!(h.compositor.deferred_windows(), 1);

    h.compositor.run_pending();
    assert_eq!(h.compositor.deferred_windows(), 1);

    h.clock
        .advance(Duration::from_millis(7000) + Duration::from_millis(1));
    h.correlator.tick();
    h.compositor.run_pending();
    assert_eq!(h.compositor.deferred_windows(), 0);
}

#[test]
fn repaint_of_closed_window_is_rejected_at_once() {
    let h = Harness::new(32, 32);
    let window = h.registry.create_window(OWNER, None, PixelFormat::Rgb16).unwrap();
    window.set_visible(OWNER, true);
    window.close(OWNER);
    h.flush();
    let queued = h.compositor.queued();

    h.registry.dirty(
        Some(Arc::clone(&window)),
        Rect::new(0, 0, 8, 8),
        None,
        12,
        DirtyMode::Async,
    );
    assert_eq!(h.compositor.queued(), queued);
    let record = h
        .correlator
        .completed_records()
        .into_iter()
        .find(|r| r.marker == 12 && r.window == Some(window.id()))
        .unwrap();
    assert_eq!(record.hardware_marker, 0);

    let resolved = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&resolved);
    h.correlator.add_wait(
        Some(window.id()),
        12,
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(resolved.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_resolves_queued_requests() {
    let h = Harness::new(32, 32);
    let window = h.registry.create_window(OWNER, None, PixelFormat::Rgb16).unwrap();
    window.set_visible(OWNER, true);
    window.repaint(OWNER, None, None, 4);
    assert!(h.compositor.queued() > 0);

    h.compositor.shutdown();
    assert_eq!(h.compositor.queued(), 0);
    assert!(h.driver.updates().is_empty());
    assert!(h
        .correlator
        .completed_records()
        .iter()
        .any(|r| r.marker == 4 && r.hardware_marker == 0));

    window.repaint(OWNER, None, None, 6);
    assert!(h
        .correlator
        .completed_records()
        .iter()
        .any(|r| r.marker == 6 && r.hardware_marker == 0));
}
