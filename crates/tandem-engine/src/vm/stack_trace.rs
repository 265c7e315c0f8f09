//! Call stack snapshots

use std::fmt;

use super::scope::Scope;

/// One frame of a stack trace. Lines and columns are 1-based; 0 means
/// unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
    /// Resource name of the script
    pub script_name: Option<String>,
    /// Source URL of the script
    pub source_url: Option<String>,
    /// Name of the running function, empty for top-level code
    pub function_name: String,
    /// Whether the frame was entered through `new`
    pub is_constructor: bool,
    /// Whether the frame is top-level evaluated code
    pub is_eval: bool,
}

impl StackFrame {
    /// Frame for top-level evaluation of a resource
    pub fn eval(resource_name: &str) -> Self {
        Self {
            line: 1,
            column: 1,
            script_name: Some(resource_name.to_string()),
            source_url: Some(resource_name.to_string()),
            is_eval: true,
            ..Self::default()
        }
    }

    /// Frame for a host function call
    pub fn function(name: &str, is_constructor: bool) -> Self {
        Self {
            function_name: name.to_string(),
            is_constructor,
            ..Self::default()
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.function_name.is_empty() {
            "<anonymous>"
        } else {
            &self.function_name
        };
        if self.is_constructor {
            write!(f, "new ")?;
        }
        match &self.script_name {
            Some(script) => write!(f, "{} ({}:{}:{})", name, script, self.line, self.column),
            None => write!(f, "{} (native)", name),
        }
    }
}

/// Snapshot of the call stack, innermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    frames: Vec<StackFrame>,
}

impl StackTrace {
    /// Build from frames ordered innermost first
    pub fn new(frames: Vec<StackFrame>) -> Self {
        Self { frames }
    }

    /// Capture the stack of the running scope
    pub fn current(scope: &Scope) -> Self {
        Self::new(scope.capture_frames())
    }

    /// Frame at `index` (0 is innermost)
    pub fn frame(&self, index: usize) -> Option<&StackFrame> {
        self.frames.get(index)
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterate frames, innermost first
    pub fn iter(&self) -> std::slice::Iter<'_, StackFrame> {
        self.frames.iter()
    }

    /// Innermost frame that belongs to a script
    pub fn script_frame(&self) -> Option<&StackFrame> {
        self.frames.iter().find(|f| f.script_name.is_some())
    }
}

impl<'a> IntoIterator for &'a StackTrace {
    type Item = &'a StackFrame;
    type IntoIter = std::slice::Iter<'a, StackFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "    at {}", frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_display() {
        let mut frame = StackFrame::eval("main.js");
        frame.line = 3;
        frame.column = 7;
        assert_eq!(frame.to_string(), "<anonymous> (main.js:3:7)");

        let native = StackFrame::function("Counter", true);
        assert_eq!(native.to_string(), "new Counter (native)");
    }

    #[test]
    fn test_script_frame() {
        let trace = StackTrace::new(vec![
            StackFrame::function("add", false),
            StackFrame::eval("main.js"),
        ]);
        assert_eq!(trace.len(), 2);
        assert_eq!(
            trace.script_frame().and_then(|f| f.script_name.as_deref()),
            Some("main.js")
        );
        assert_eq!(trace.iter().count(), 2);
        assert!(trace.to_string().contains("at add (native)"));
    }
}
