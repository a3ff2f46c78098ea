use proptest::prelude::*;
use quill_compositor_core::input::{
    KeyEvent, KeyType, PointState, TabletEvent, TabletTool, TabletType, TouchEvent, TouchPoint,
    TouchTool, TouchType,
};
use quill_compositor_core::{FrameReader, WindowEvent};

fn touch_point() -> impl Strategy<Value = TouchPoint> {
    (
        any::<i32>(),
        0u16..4,
        (0.0f64..=1.0, 0.0f64..=1.0),
        (0.0f64..100.0, 0.0f64..100.0),
        0u16..2,
        (0.0f64..=1.0, -180.0f64..180.0),
    )
        .prop_map(|(id, state, (x, y), (width, height), tool, (pressure, rotation))| TouchPoint {
            id,
            state: PointState::from_wire(state).unwrap(),
            x,
            y,
            width,
            height,
            tool: TouchTool::from_wire(tool).unwrap(),
            pressure,
            rotation,
        })
}

fn window_event() -> impl Strategy<Value = WindowEvent> {
    prop_oneof![
        prop::sample::select(vec![
            WindowEvent::Invalid,
            WindowEvent::Raise,
            WindowEvent::Lower,
            WindowEvent::Close,
            WindowEvent::FrameBuffer,
            WindowEvent::Ping,
        ]),
        (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>(), any::<u64>(), any::<u32>()).prop_map(
            |(x, y, width, height, waveform, marker)| WindowEvent::Repaint {
                x,
                y,
                width,
                height,
                waveform,
                marker,
            }
        ),
        any::<u32>().prop_map(|marker| WindowEvent::WaitForPaint { marker }),
        (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>())
            .prop_map(|(x, y, width, height, z)| WindowEvent::Geometry { x, y, width, height, z }),
        (any::<u64>(), any::<u64>(), any::<i32>()).prop_map(|(size_in_bytes, bytes_per_line, format)| {
            WindowEvent::ImageInfo {
                size_in_bytes,
                bytes_per_line,
                format,
            }
        }),
        (0u16..3, any::<u32>(), any::<u32>(), any::<u32>()).prop_map(|(kind, code, unicode, scan_code)| {
            WindowEvent::Key(KeyEvent {
                event_type: KeyType::from_wire(kind).unwrap(),
                code,
                unicode,
                scan_code,
            })
        }),
        (0u16..4, prop::collection::vec(touch_point(), 0..6)).prop_map(|(kind, points)| {
            WindowEvent::Touch(TouchEvent {
                event_type: TouchType::from_wire(kind).unwrap(),
                points,
            })
        }),
        (0u16..5, 0u16..2, any::<i32>(), any::<i32>(), 0.0f64..=1.0, -90i32..=90, -90i32..=90).prop_map(
            |(kind, tool, x, y, pressure, tilt_x, tilt_y)| {
                WindowEvent::Tablet(TabletEvent {
                    event_type: TabletType::from_wire(kind).unwrap(),
                    tool: TabletTool::from_wire(tool).unwrap(),
                    x,
                    y,
                    pressure,
                    tilt_x,
                    tilt_y,
                })
            }
        ),
    ]
}

proptest! {
    #[test]
    fn decode_returns_what_was_encoded(event in window_event()) {
        let bytes = event.encode();
        let (decoded, used) = WindowEvent::decode(&bytes).unwrap();
        prop_assert_eq!(used, bytes.len());
        prop_assert_eq!(decoded, event);
    }

    #[test]
    fn stream_split_anywhere_reassembles(
        events in prop::collection::vec(window_event(), 1..8),
        chunk in 1usize..17,
    ) {
        let stream: Vec<u8> = events.iter().flat_map(WindowEvent::encode).collect();
        let mut reader = FrameReader::new();
        let mut decoded = Vec::new();
        for piece in stream.chunks(chunk) {
            reader.push(piece);
            while let Some(event) = reader.next_event().unwrap() {
                decoded.push(event);
            }
        }
        prop_assert_eq!(reader.buffered(), 0);
        prop_assert_eq!(decoded, events);
    }

    #[test]
    fn prefixes_never_decode(event in window_event()) {
        let bytes = event.encode();
        for len in 0..bytes.len() {
            prop_assert!(WindowEvent::decode(&bytes[..len]).is_err());
        }
    }
}
