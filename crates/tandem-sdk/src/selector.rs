//! Method selectors
//!
//! A selector is the colon-delimited name of a native method, e.g.
//! `doFoo:withBar:`. Each colon introduces one argument.

use std::fmt;
use std::rc::Rc;

/// Name of a native method
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector(Rc<str>);

impl Selector {
    /// Create a selector from its name
    pub fn new(name: &str) -> Self {
        Selector(Rc::from(name))
    }

    /// The selector's full name
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Number of arguments the selector takes
    pub fn arity(&self) -> usize {
        self.0.matches(':').count()
    }

    /// Default script-visible property name.
    ///
    /// Colons are removed and the letter following each inner colon is
    /// upper-cased: `doFoo:withBar:` becomes `doFooWithBar`.
    pub fn script_name(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut capitalize_next = false;
        for c in self.0.chars() {
            if c == ':' {
                capitalize_next = true;
            } else if capitalize_next {
                out.extend(c.to_uppercase());
                capitalize_next = false;
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Whether the selector names an initializer (`init`, `initWith...:`)
    pub fn is_initializer(&self) -> bool {
        match self.0.strip_prefix("init") {
            Some(rest) => rest
                .chars()
                .next()
                .map_or(true, |c| c == ':' || c.is_ascii_uppercase()),
            None => false,
        }
    }

    /// Conventional setter selector for a property (`value` -> `setValue:`)
    pub fn setter_for(property: &str) -> Self {
        let mut name = String::with_capacity(property.len() + 4);
        name.push_str("set");
        let mut chars = property.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
        name.push(':');
        Selector::new(&name)
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::new(name)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@selector({})", self.0)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert_eq!(Selector::new("count").arity(), 0);
        assert_eq!(Selector::new("add:").arity(), 1);
        assert_eq!(Selector::new("doFoo:withBar:").arity(), 2);
    }

    #[test]
    fn test_script_name() {
        assert_eq!(Selector::new("count").script_name(), "count");
        assert_eq!(Selector::new("add:").script_name(), "add");
        assert_eq!(Selector::new("doFoo:withBar:").script_name(), "doFooWithBar");
        assert_eq!(
            Selector::new("insertObject:atIndex:").script_name(),
            "insertObjectAtIndex"
        );
    }

    #[test]
    fn test_is_initializer() {
        assert!(Selector::new("init").is_initializer());
        assert!(Selector::new("initWithValue:").is_initializer());
        assert!(!Selector::new("initialize").is_initializer());
        assert!(!Selector::new("value").is_initializer());
    }

    #[test]
    fn test_setter_for() {
        assert_eq!(Selector::setter_for("value").name(), "setValue:");
        assert_eq!(Selector::setter_for("x").name(), "setX:");
    }
}
