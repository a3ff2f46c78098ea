//! Input event shapes.
//!
//! Host events arrive in screen pixels from the input handlers. Before they are
//! forwarded to a window they are translated into the wire shapes carried by
//! the event pipes: touch positions become normalized `0.0..=1.0` fractions of
//! the screen, everything else passes through unchanged.

use quill_core::types::Rect;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn from_wire(value: u16) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn to_wire(self) -> u16 {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }
    };
}

wire_enum!(
    /// Phase of a multi-point touch event.
    TouchType { Press = 0, Update = 1, Release = 2, Cancel = 3 }
);

wire_enum!(
    /// State of a single touch point.
    PointState { Press = 0, Move = 1, Release = 2, Stationary = 3 }
);

wire_enum!(
    TouchTool { Finger = 0, Token = 1 }
);

wire_enum!(
    KeyType { Release = 0, Press = 1, Repeat = 2 }
);

wire_enum!(
    TabletType { PenPress = 0, PenUpdate = 1, PenRelease = 2, PenEnterProximity = 3, PenLeaveProximity = 4 }
);

wire_enum!(
    TabletTool { Pen = 0, Eraser = 1 }
);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: i32,
    pub state: PointState,
    /// Normalized horizontal position.
    pub x: f64,
    /// Normalized vertical position.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub tool: TouchTool,
    pub pressure: f64,
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchEvent {
    pub event_type: TouchType,
    pub points: Vec<TouchPoint>,
}

impl TouchEvent {
    /// A cancel for the given slots, sent when a window loses its input
    /// stream in the middle of a gesture.
    pub fn cancel(slots: impl IntoIterator<Item = i32>) -> Self {
        TouchEvent {
            event_type: TouchType::Cancel,
            points: slots
                .into_iter()
                .map(|id| TouchPoint {
                    id,
                    state: PointState::Release,
                    x: 0.0,
                    y: 0.0,
                    width: 0.0,
                    height: 0.0,
                    tool: TouchTool::Finger,
                    pressure: 0.0,
                    rotation: 0.0,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabletEvent {
    pub event_type: TabletType,
    pub tool: TabletTool,
    pub x: i32,
    pub y: i32,
    pub pressure: f64,
    pub tilt_x: i32,
    pub tilt_y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub event_type: KeyType,
    pub code: u32,
    pub unicode: u32,
    pub scan_code: u32,
}

/// A touch contact as reported by the digitizer, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostTouchPoint {
    pub slot: i32,
    pub state: PointState,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub tool: TouchTool,
    pub pressure: f64,
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostTouchEvent {
    pub event_type: TouchType,
    pub points: Vec<HostTouchPoint>,
}

/// Events produced by the host input handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum HostInputEvent {
    Touch(HostTouchEvent),
    Tablet(TabletEvent),
    Key(KeyEvent),
}

/// Converts pixel positions into fractions of `screen`.
pub fn translate_touch(event: &HostTouchEvent, screen: Rect) -> TouchEvent {
    let width = f64::from(screen.width.max(1));
    let height = f64::from(screen.height.max(1));
    TouchEvent {
        event_type: event.event_type,
        points: event
            .points
            .iter()
            .map(|p| TouchPoint {
                id: p.slot,
                state: p.state,
                x: (p.x - f64::from(screen.x)) / width,
                y: (p.y - f64::from(screen.y)) / height,
                width: p.width,
                height: p.height,
                tool: p.tool,
                pressure: p.pressure,
                rotation: p.rotation,
            })
            .collect(),
    }
}
