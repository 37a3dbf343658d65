//! Method registry: fully qualified method name → invocation record.

use crate::context::MethodInfo;
use crate::invoker::Invoker;
use std::collections::HashMap;
use std::sync::Arc;
use tether_kernel::gateway::GatewayError;

/// One registered method.
#[derive(Clone)]
pub struct MethodEntry {
    pub info: Arc<MethodInfo>,
    pub invoker: Arc<dyn Invoker>,
}

/// Registry backed by a simple `HashMap`.
///
/// Built once during startup and read-only while serving, so lookups take
/// no lock.
#[derive(Default)]
pub struct ServiceRegistry {
    methods: HashMap<String, MethodEntry>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a method to its invoker. A method may be bound only once.
    pub fn register(
        &mut self,
        info: Arc<MethodInfo>,
        invoker: Arc<dyn Invoker>,
    ) -> Result<(), GatewayError> {
        let name = info.full_method().to_string();
        if self.methods.contains_key(&name) {
            return Err(GatewayError::DuplicateMethod(name));
        }
        self.methods.insert(name, MethodEntry { info, invoker });
        Ok(())
    }

    pub fn lookup(&self, full_method: &str) -> Option<&MethodEntry> {
        self.methods.get(full_method)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use crate::invoker::InvocationMode;
    use crate::message::AnyMessage;
    use async_trait::async_trait;
    use tether_kernel::gateway::Status;

    struct Nop;

    #[async_trait]
    impl Invoker for Nop {
        fn mode(&self) -> InvocationMode {
            InvocationMode::Local
        }

        async fn invoke(&self, _ctx: &CallContext, request: AnyMessage) -> Result<AnyMessage, Status> {
            Ok(request)
        }
    }

    fn info(name: &str) -> Arc<MethodInfo> {
        Arc::new(MethodInfo::new(name, "POST /x"))
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ServiceRegistry::new();
        reg.register(info("/a.B/C"), Arc::new(Nop)).unwrap();
        assert!(reg.lookup("/a.B/C").is_some());
        assert!(reg.lookup("/a.B/D").is_none());
        assert_eq!(reg.method_names(), ["/a.B/C"]);
    }

    #[test]
    fn duplicate_register_returns_error() {
        let mut reg = ServiceRegistry::new();
        reg.register(info("/a.B/C"), Arc::new(Nop)).unwrap();
        assert_eq!(
            reg.register(info("/a.B/C"), Arc::new(Nop)),
            Err(GatewayError::DuplicateMethod("/a.B/C".into()))
        );
        assert_eq!(reg.len(), 1);
    }
}
