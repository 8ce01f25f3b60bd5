use futures_core::future::BoxFuture;

/// Client of the message broker receiving serialized [`LogRecord`](crate::LogRecord)s.
///
/// Implementations own their connection handling and delivery semantics. The access logger
/// spawns every `send` in the background and never looks at the outcome.
///
/// # Examples
/// ```rust
/// use actix_web_middleware_accesslog::BrokerSink;
/// use futures_core::future::BoxFuture;
///
/// struct StdoutBroker;
///
/// impl BrokerSink for StdoutBroker {
///     fn send(&self, data: Vec<u8>) -> BoxFuture<'_, ()> {
///         Box::pin(async move {
///             println!("{}", String::from_utf8_lossy(&data));
///         })
///     }
/// }
/// ```
pub trait BrokerSink: Send + Sync {
    fn send(&self, data: Vec<u8>) -> BoxFuture<'_, ()>;
}
