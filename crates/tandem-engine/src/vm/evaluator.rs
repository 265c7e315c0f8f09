//! Script evaluation boundary
//!
//! The engine does not parse source text itself. An embedder installs a
//! [`ScriptEvaluator`] that runs source inside a scope, reporting positions
//! through [`Scope::set_source_position`] and throwing through the scope's
//! error constructors.

use super::function::ScriptResult;
use super::scope::Scope;
use super::value::Value;

/// Runs source text in a scope
pub trait ScriptEvaluator {
    /// Evaluate `source`, registered under `resource_name`
    fn evaluate(&self, scope: &Scope, source: &str, resource_name: &str) -> ScriptResult<Value>;
}

impl<F> ScriptEvaluator for F
where
    F: Fn(&Scope, &str, &str) -> ScriptResult<Value>,
{
    fn evaluate(&self, scope: &Scope, source: &str, resource_name: &str) -> ScriptResult<Value> {
        self(scope, source, resource_name)
    }
}
