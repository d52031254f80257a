use std::collections::HashMap;
use std::fmt;

use muxrpc_codec::CodecType;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, RpcError};
use crate::server::Dispatch;

type MethodFn = Box<dyn Fn(CodecType, &[u8]) -> std::result::Result<Vec<u8>, String> + Send + Sync>;

/// A named group of methods, addressed as `"Service.Method"`.
///
/// Methods are typed closures; argument decoding and reply encoding use the
/// codec of the connection the request came in on.
///
/// ```
/// use muxrpc_core::Service;
///
/// let arith = Service::new("Arith")
///     .method("Sum", |(a, b): (i64, i64)| Ok(a + b))
///     .method("Neg", |n: i64| Ok(-n));
/// assert_eq!(arith.method_names(), vec!["Neg", "Sum"]);
/// ```
pub struct Service {
    name: String,
    methods: HashMap<String, MethodFn>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Add a method. An `Err` returned by `handler` is sent back to the
    /// caller as the response error.
    pub fn method<A, R, F>(mut self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> std::result::Result<R, String> + Send + Sync + 'static,
    {
        let full_name = format!("{}.{}", self.name, name);
        let method: MethodFn = Box::new(move |codec, raw| {
            let args: A = codec
                .decode(raw)
                .map_err(|err| format!("rpc server: decode args for {full_name}: {err}"))?;
            let reply = handler(args)?;
            codec
                .encode(&reply)
                .map_err(|err| format!("rpc server: encode reply for {full_name}: {err}"))
        });
        self.methods.insert(name.to_string(), method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RpcError::InvalidService("empty service name".to_string()));
        }
        if self.methods.is_empty() {
            return Err(RpcError::InvalidService(format!(
                "service {} has no methods",
                self.name
            )));
        }
        if let Some(bad) = self
            .methods
            .keys()
            .find(|name| name.is_empty() || name.contains('.'))
        {
            return Err(RpcError::InvalidService(format!(
                "method name {bad:?} of service {}",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Services a server dispatches to, keyed by name.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Service>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. Names must be unique.
    pub fn register(&mut self, service: Service) -> Result<()> {
        service.validate()?;
        if self.services.contains_key(&service.name) {
            return Err(RpcError::ServiceExists(service.name));
        }
        debug!(service = %service.name, methods = service.methods.len(), "registered service");
        self.services.insert(service.name.clone(), service);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_service(mut self, service: Service) -> Result<Self> {
        self.register(service)?;
        Ok(self)
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn find(&self, service_method: &str) -> std::result::Result<&MethodFn, String> {
        let (service_name, method_name) = service_method.rsplit_once('.').ok_or_else(|| {
            format!("rpc server: service/method request ill-formed: {service_method}")
        })?;
        let service = self
            .services
            .get(service_name)
            .ok_or_else(|| format!("rpc server: can't find service {service_method}"))?;
        service
            .methods
            .get(method_name)
            .ok_or_else(|| format!("rpc server: can't find method {service_method}"))
    }
}

impl Dispatch for ServiceRegistry {
    fn dispatch(
        &self,
        service_method: &str,
        codec: CodecType,
        args: &[u8],
    ) -> std::result::Result<Vec<u8>, String> {
        let method = self.find(service_method)?;
        method(codec, args)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new()
            .with_service(
                Service::new("Arith")
                    .method("Sum", |args: Args| Ok(args.num1 + args.num2))
                    .method("Div", |args: Args| {
                        if args.num2 == 0 {
                            return Err("divide by zero".to_string());
                        }
                        Ok(args.num1 / args.num2)
                    }),
            )
            .unwrap()
    }

    fn call(
        registry: &ServiceRegistry,
        method: &str,
        args: &Args,
    ) -> std::result::Result<i64, String> {
        let codec = CodecType::Json;
        let raw = codec.encode(args).unwrap();
        let reply = registry.dispatch(method, codec, &raw)?;
        Ok(codec.decode(&reply).unwrap())
    }

    #[test]
    fn dispatches_to_method() {
        let reg = registry();
        assert_eq!(call(&reg, "Arith.Sum", &Args { num1: 2, num2: 3 }), Ok(5));
    }

    #[test]
    fn handler_error_passes_through() {
        let reg = registry();
        let err = call(&reg, "Arith.Div", &Args { num1: 1, num2: 0 }).unwrap_err();
        assert_eq!(err, "divide by zero");
    }

    #[test]
    fn lookup_errors_name_the_request() {
        let reg = registry();
        let args = Args { num1: 1, num2: 1 };
        assert!(call(&reg, "ArithSum", &args)
            .unwrap_err()
            .contains("ill-formed: ArithSum"));
        assert!(call(&reg, "Geo.Area", &args)
            .unwrap_err()
            .contains("can't find service Geo.Area"));
        assert!(call(&reg, "Arith.Mul", &args)
            .unwrap_err()
            .contains("can't find method Arith.Mul"));
    }

    #[test]
    fn bad_args_are_reported_not_fatal() {
        let reg = registry();
        let raw = CodecType::Json.encode("not args").unwrap();
        let err = reg.dispatch("Arith.Sum", CodecType::Json, &raw).unwrap_err();
        assert!(err.contains("decode args for Arith.Sum"));
    }

    #[test]
    fn works_with_binary_codec() {
        let reg = registry();
        let codec = CodecType::Bincode;
        let raw = codec.encode(&Args { num1: 40, num2: 2 }).unwrap();
        let reply = reg.dispatch("Arith.Sum", codec, &raw).unwrap();
        assert_eq!(codec.decode::<i64>(&reply).unwrap(), 42);
    }

    #[test]
    fn duplicate_service_rejected() {
        let mut reg = registry();
        let err = reg
            .register(Service::new("Arith").method("Sum", |n: i64| Ok(n)))
            .unwrap_err();
        assert!(matches!(err, RpcError::ServiceExists(ref name) if name == "Arith"));
    }

    #[test]
    fn invalid_services_rejected() {
        let mut reg = ServiceRegistry::new();
        assert!(matches!(
            reg.register(Service::new("").method("Sum", |n: i64| Ok(n))),
            Err(RpcError::InvalidService(_))
        ));
        assert!(matches!(
            reg.register(Service::new("Empty")),
            Err(RpcError::InvalidService(_))
        ));
        assert!(matches!(
            reg.register(Service::new("Dotted").method("a.b", |n: i64| Ok(n))),
            Err(RpcError::InvalidService(_))
        ));
        assert!(reg.service_names().is_empty());
    }

    #[test]
    fn dotted_service_names_resolve_on_last_dot() {
        let reg = ServiceRegistry::new()
            .with_service(Service::new("v1.Echo").method("Say", |s: String| Ok(s)))
            .unwrap();
        let raw = CodecType::Json.encode("hi").unwrap();
        let reply = reg.dispatch("v1.Echo.Say", CodecType::Json, &raw).unwrap();
        assert_eq!(CodecType::Json.decode::<String>(&reply).unwrap(), "hi");
    }
}
