//! Service message types
//!
//! Hand-written schema bindings for a few messages a debugger exchanges with
//! the host: console output and the window list. Each type keeps plain Rust
//! fields and exposes them to the codecs through [`Message`].

use std::sync::OnceLock;

use crate::bitmap::PresenceBitmap;
use crate::proxy::{FieldMut, FieldRef, Message};
use crate::schema::{FieldDescriptor, FieldKind, MessageDescriptor};

/// Service names used by the bundled messages
pub mod services {
    /// Console logging service
    pub const CONSOLE: &str = "console-logger";
    /// Window manager service
    pub const WINDOW_MANAGER: &str = "window-manager";
}

/// Command identifiers used by the bundled messages
pub mod commands {
    /// Event carrying a [`super::ConsoleMessage`]
    pub const ON_CONSOLE_MESSAGE: u32 = 3;
    /// Call returning a [`super::WindowList`]
    pub const LIST_WINDOWS: u32 = 1;
}

/// Severity of a console message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Severity {
    /// Debug output
    Debug = 0,
    /// Informational output
    Information = 1,
    /// Warning
    Warning = 2,
    /// Error
    Error = 3,
}

impl Severity {
    /// Map a wire value back to a severity
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Severity::Debug),
            1 => Some(Severity::Information),
            2 => Some(Severity::Warning),
            3 => Some(Severity::Error),
            _ => None,
        }
    }
}

/// Console output from a window
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleMessage {
    /// Window the message came from
    pub window_id: u32,
    /// Milliseconds since the epoch
    pub time: u64,
    /// Message text
    pub description: String,
    uri: String,
    line: u32,
    severity: i32,
    context: String,
    presence: PresenceBitmap,
}

impl ConsoleMessage {
    /// Index of the `window_id` field
    pub const WINDOW_ID: usize = 0;
    /// Index of the `time` field
    pub const TIME: usize = 1;
    /// Index of the `description` field
    pub const DESCRIPTION: usize = 2;
    /// Index of the `uri` field
    pub const URI: usize = 3;
    /// Index of the `line` field
    pub const LINE: usize = 4;
    /// Index of the `severity` field
    pub const SEVERITY: usize = 5;
    /// Index of the `context` field
    pub const CONTEXT: usize = 6;

    /// Schema shared by every instance
    pub fn descriptor() -> &'static MessageDescriptor {
        static DESCRIPTOR: OnceLock<MessageDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            MessageDescriptor::new(
                "ConsoleMessage",
                vec![
                    FieldDescriptor::required("window_id", 1, FieldKind::Uint32),
                    FieldDescriptor::required("time", 2, FieldKind::Uint64),
                    FieldDescriptor::required("description", 3, FieldKind::String),
                    FieldDescriptor::optional("uri", 4, FieldKind::String),
                    FieldDescriptor::optional("line", 5, FieldKind::Uint32),
                    FieldDescriptor::optional("severity", 6, FieldKind::Enum),
                    FieldDescriptor::optional("context", 7, FieldKind::String),
                ],
            )
        })
    }

    /// Message with the required fields set
    pub fn new(window_id: u32, time: u64, description: impl Into<String>) -> Self {
        Self {
            window_id,
            time,
            description: description.into(),
            ..Self::default()
        }
    }

    /// Script or document the message refers to
    pub fn uri(&self) -> Option<&str> {
        self.presence.is_set(Self::URI).then_some(self.uri.as_str())
    }

    /// Set the `uri` field
    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
        self.mark(Self::URI);
    }

    /// Line number within `uri`
    pub fn line(&self) -> Option<u32> {
        self.presence.is_set(Self::LINE).then_some(self.line)
    }

    /// Set the `line` field
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
        self.mark(Self::LINE);
    }

    /// Severity, when the host sent a known value
    pub fn severity(&self) -> Option<Severity> {
        if self.presence.is_set(Self::SEVERITY) {
            Severity::from_i32(self.severity)
        } else {
            None
        }
    }

    /// Set the `severity` field
    pub fn set_severity(&mut self, severity: Severity) {
        self.severity = severity as i32;
        self.mark(Self::SEVERITY);
    }

    /// Free-form context, e.g. the console API that produced the message
    pub fn context(&self) -> Option<&str> {
        self.presence
            .is_set(Self::CONTEXT)
            .then_some(self.context.as_str())
    }

    /// Set the `context` field
    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = context.into();
        self.mark(Self::CONTEXT);
    }

    fn mark(&mut self, index: usize) {
        // Indexes come from the constants above and are always in range.
        let _ = self.presence.set(index);
    }
}

impl Default for ConsoleMessage {
    fn default() -> Self {
        Self {
            window_id: 0,
            time: 0,
            description: String::new(),
            uri: String::new(),
            line: 0,
            severity: 0,
            context: String::new(),
            presence: PresenceBitmap::new(Self::descriptor().len()),
        }
    }
}

impl Message for ConsoleMessage {
    fn descriptor(&self) -> &'static MessageDescriptor {
        Self::descriptor()
    }

    fn field(&self, index: usize) -> Option<FieldRef<'_>> {
        Some(match index {
            Self::WINDOW_ID => FieldRef::U32(self.window_id),
            Self::TIME => FieldRef::U64(self.time),
            Self::DESCRIPTION => FieldRef::Str(&self.description),
            Self::URI => FieldRef::Str(&self.uri),
            Self::LINE => FieldRef::U32(self.line),
            Self::SEVERITY => FieldRef::I32(self.severity),
            Self::CONTEXT => FieldRef::Str(&self.context),
            _ => return None,
        })
    }

    fn field_mut(&mut self, index: usize) -> Option<FieldMut<'_>> {
        Some(match index {
            Self::WINDOW_ID => FieldMut::U32(&mut self.window_id),
            Self::TIME => FieldMut::U64(&mut self.time),
            Self::DESCRIPTION => FieldMut::Str(&mut self.description),
            Self::URI => FieldMut::Str(&mut self.uri),
            Self::LINE => FieldMut::U32(&mut self.line),
            Self::SEVERITY => FieldMut::I32(&mut self.severity),
            Self::CONTEXT => FieldMut::Str(&mut self.context),
            _ => return None,
        })
    }

    fn presence(&self) -> Option<&PresenceBitmap> {
        Some(&self.presence)
    }

    fn presence_mut(&mut self) -> Option<&mut PresenceBitmap> {
        Some(&mut self.presence)
    }
}

/// One browser window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    /// Window identifier
    pub window_id: u32,
    /// Document title
    pub title: String,
    opener_id: u32,
    presence: PresenceBitmap,
}

impl WindowInfo {
    /// Index of the `window_id` field
    pub const WINDOW_ID: usize = 0;
    /// Index of the `title` field
    pub const TITLE: usize = 1;
    /// Index of the `opener_id` field
    pub const OPENER_ID: usize = 2;

    /// Schema shared by every instance
    pub fn descriptor() -> &'static MessageDescriptor {
        static DESCRIPTOR: OnceLock<MessageDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            MessageDescriptor::new(
                "WindowInfo",
                vec![
                    FieldDescriptor::required("window_id", 1, FieldKind::Uint32),
                    FieldDescriptor::required("title", 2, FieldKind::String),
                    FieldDescriptor::optional("opener_id", 3, FieldKind::Uint32),
                ],
            )
        })
    }

    /// Window with the required fields set
    pub fn new(window_id: u32, title: impl Into<String>) -> Self {
        Self {
            window_id,
            title: title.into(),
            ..Self::default()
        }
    }

    /// Window that opened this one
    pub fn opener_id(&self) -> Option<u32> {
        self.presence
            .is_set(Self::OPENER_ID)
            .then_some(self.opener_id)
    }

    /// Set the `opener_id` field
    pub fn set_opener_id(&mut self, opener_id: u32) {
        self.opener_id = opener_id;
        let _ = self.presence.set(Self::OPENER_ID);
    }
}

impl Default for WindowInfo {
    fn default() -> Self {
        Self {
            window_id: 0,
            title: String::new(),
            opener_id: 0,
            presence: PresenceBitmap::new(Self::descriptor().len()),
        }
    }
}

impl Message for WindowInfo {
    fn descriptor(&self) -> &'static MessageDescriptor {
        Self::descriptor()
    }

    fn field(&self, index: usize) -> Option<FieldRef<'_>> {
        Some(match index {
            Self::WINDOW_ID => FieldRef::U32(self.window_id),
            Self::TITLE => FieldRef::Str(&self.title),
            Self::OPENER_ID => FieldRef::U32(self.opener_id),
            _ => return None,
        })
    }

    fn field_mut(&mut self, index: usize) -> Option<FieldMut<'_>> {
        Some(match index {
            Self::WINDOW_ID => FieldMut::U32(&mut self.window_id),
            Self::TITLE => FieldMut::Str(&mut self.title),
            Self::OPENER_ID => FieldMut::U32(&mut self.opener_id),
            _ => return None,
        })
    }

    fn presence(&self) -> Option<&PresenceBitmap> {
        Some(&self.presence)
    }

    fn presence_mut(&mut self) -> Option<&mut PresenceBitmap> {
        Some(&mut self.presence)
    }
}

/// Reply to `LIST_WINDOWS`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowList {
    /// Every open window
    pub windows: Vec<WindowInfo>,
    active: WindowInfo,
    presence: PresenceBitmap,
}

impl WindowList {
    /// Index of the `windows` field
    pub const WINDOWS: usize = 0;
    /// Index of the `active` field
    pub const ACTIVE: usize = 1;

    /// Schema shared by every instance
    pub fn descriptor() -> &'static MessageDescriptor {
        static DESCRIPTOR: OnceLock<MessageDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            MessageDescriptor::new(
                "WindowList",
                vec![
                    FieldDescriptor::repeated("windows", 1, FieldKind::Message)
                        .with_message(WindowInfo::descriptor),
                    FieldDescriptor::optional("active", 2, FieldKind::Message)
                        .with_message(WindowInfo::descriptor),
                ],
            )
        })
    }

    /// Window that has focus
    pub fn active(&self) -> Option<&WindowInfo> {
        self.presence.is_set(Self::ACTIVE).then_some(&self.active)
    }

    /// Set the `active` field
    pub fn set_active(&mut self, window: WindowInfo) {
        self.active = window;
        let _ = self.presence.set(Self::ACTIVE);
    }
}

impl Default for WindowList {
    fn default() -> Self {
        Self {
            windows: Vec::new(),
            active: WindowInfo::default(),
            presence: PresenceBitmap::new(Self::descriptor().len()),
        }
    }
}

impl Message for WindowList {
    fn descriptor(&self) -> &'static MessageDescriptor {
        Self::descriptor()
    }

    fn field(&self, index: usize) -> Option<FieldRef<'_>> {
        Some(match index {
            Self::WINDOWS => FieldRef::Repeated(&self.windows),
            Self::ACTIVE => FieldRef::Message(&self.active),
            _ => return None,
        })
    }

    fn field_mut(&mut self, index: usize) -> Option<FieldMut<'_>> {
        Some(match index {
            Self::WINDOWS => FieldMut::Repeated(&mut self.windows),
            Self::ACTIVE => FieldMut::Message(&mut self.active),
            _ => return None,
        })
    }

    fn presence(&self) -> Option<&PresenceBitmap> {
        Some(&self.presence)
    }

    fn presence_mut(&mut self) -> Option<&mut PresenceBitmap> {
        Some(&mut self.presence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_validate() {
        ConsoleMessage::descriptor().validate().unwrap();
        WindowInfo::descriptor().validate().unwrap();
        WindowList::descriptor().validate().unwrap();
    }

    #[test]
    fn test_optional_accessors() {
        let mut msg = ConsoleMessage::new(1, 2, "hello");
        assert_eq!(msg.uri(), None);
        assert_eq!(msg.line(), None);
        assert_eq!(msg.severity(), None);

        msg.set_line(0);
        msg.set_severity(Severity::Warning);
        assert_eq!(msg.line(), Some(0));
        assert_eq!(msg.severity(), Some(Severity::Warning));
    }

    #[test]
    fn test_window_list_active() {
        let mut list = WindowList::default();
        assert!(list.active().is_none());
        list.set_active(WindowInfo::new(9, "Docs"));
        assert_eq!(list.active().map(|w| w.window_id), Some(9));
    }
}
