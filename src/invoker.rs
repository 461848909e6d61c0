//! Invoker (spec.md §4.7): given an invocation context, construct or reuse
//! an instance and invoke the resolved method, classifying the outcome.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::{
    descriptor::MethodDescriptor,
    error::InvokeError,
    registry::{Resolved, Resource},
    value::Value,
};

/// Per-request terminal states (spec.md §4.7's state machine). Dispatch owns
/// the `ENCODED`/`WRITTEN` tail; the invoker only produces these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    FailedBusiness,
    FailedServer,
}

/// Stateless; safe for parallel use (spec.md §4.7 concurrency note).
#[derive(Default, Clone, Copy)]
pub struct Invoker;

impl Invoker {
    pub fn invoke(
        &self,
        resolved: &Resolved,
        method: &MethodDescriptor,
        args: Vec<Value>,
    ) -> (Outcome, Result<Value, InvokeError>) {
        let descriptor = method.descriptor();

        let instance: Box<dyn Resource> = match resolved {
            Resolved::Singleton(instance) => {
                return Self::call(instance.as_ref(), method.name, &descriptor, args);
            }
            Resolved::Factory(factory, _) => {
                match catch_unwind(AssertUnwindSafe(factory)) {
                    Ok(instance) => instance,
                    Err(_) => {
                        return (
                            Outcome::FailedServer,
                            Err(InvokeError::NotInstantiable(method.name.to_string())),
                        )
                    }
                }
            }
        };

        Self::call(instance.as_ref(), method.name, &descriptor, args)
    }

    fn call(
        resource: &dyn Resource,
        method_name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> (Outcome, Result<Value, InvokeError>) {
        tracing::debug!(method = method_name, descriptor, "invoke");
        match catch_unwind(AssertUnwindSafe(|| resource.invoke(method_name, descriptor, args))) {
            Ok(Ok(value)) => (Outcome::Succeeded, Ok(value)),
            Ok(Err(InvokeError::Business { type_name, message })) => (
                Outcome::FailedBusiness,
                Err(InvokeError::Business { type_name, message }),
            ),
            Ok(Err(err)) => (Outcome::FailedServer, Err(err)),
            Err(panic) => {
                let message = panic_message(&panic);
                (
                    Outcome::FailedServer,
                    Err(InvokeError::Server {
                        type_name: "java.lang.RuntimeException".to_string(),
                        message,
                    }),
                )
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
