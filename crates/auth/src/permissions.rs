use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission name in `<module>.<action>` form (e.g. `"invoices.validate"`).
///
/// `"*"` grants everything; `"<module>.*"` grants every action of one module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` satisfies a requirement for `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self.0 == required.0 {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(module) => required
                .as_str()
                .strip_prefix(module)
                .is_some_and(|rest| rest.starts_with('.')),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_wildcard_covers_only_its_module() {
        let leave_all = Permission::new("leave.*");
        assert!(leave_all.grants(&Permission::new("leave.submit")));
        assert!(!leave_all.grants(&Permission::new("leaves.submit")));
        assert!(!leave_all.grants(&Permission::new("invoices.read")));
        assert!(Permission::new("*").grants(&Permission::new("import.run")));
    }
}
