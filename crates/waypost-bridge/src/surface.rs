//! The declared set of operations a bridge may call.

use std::collections::BTreeMap;

use waypost_protocol::Operation;

use crate::BridgeError;

/// A validated, immutable declaration of callable operations.
///
/// Built once at startup. Only operations listed here resolve; anything
/// else is an unknown route and never reaches the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    operations: Vec<Operation>,
}

impl Surface {
    /// Declares a surface.
    ///
    /// # Errors
    /// [`BridgeError::InvalidSurface`] if `operations` is empty or names the
    /// same operation twice.
    pub fn new(
        operations: impl IntoIterator<Item = Operation>,
    ) -> Result<Self, BridgeError> {
        let mut declared = Vec::new();
        for op in operations {
            if declared.contains(&op) {
                return Err(BridgeError::InvalidSurface(format!(
                    "{op} declared more than once"
                )));
            }
            declared.push(op);
        }
        if declared.is_empty() {
            return Err(BridgeError::InvalidSurface(
                "no operations declared".into(),
            ));
        }
        Ok(Self {
            operations: declared,
        })
    }

    /// Every known operation.
    pub fn all() -> Self {
        Self {
            operations: Operation::ALL.to_vec(),
        }
    }

    /// Resolves a `(domain, method)` pair to a declared operation.
    pub fn resolve(&self, domain: &str, method: &str) -> Option<Operation> {
        Operation::from_parts(domain, method).filter(|op| self.contains(*op))
    }

    pub fn contains(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// The surface as `{domain: {method: [argNames]}}`.
    pub fn describe(
        &self,
    ) -> BTreeMap<&'static str, BTreeMap<&'static str, &'static [&'static str]>>
    {
        let mut out: BTreeMap<_, BTreeMap<_, _>> = BTreeMap::new();
        for op in &self.operations {
            out.entry(op.domain())
                .or_default()
                .insert(op.method(), op.arg_names());
        }
        out
    }
}
