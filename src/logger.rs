use std::{
    future::Future,
    io::Write,
    marker::PhantomData,
    pin::Pin,
    rc::Rc,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures_core::ready;
use pin_project_lite::pin_project;
use time::OffsetDateTime;

use actix_service::{Service, Transform};
use actix_utils::future::{Ready, ready};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::{Error, Result};

use crate::broker::BrokerSink;
use crate::config::Config;
use crate::record::{LogRecord, RequestMeta, ResponseMeta, access_line};
use crate::router::Dispatcher;
use crate::shipper::HttpLogShipper;
use crate::writer::{SharedWriter, TimestampWriter, open_log_sink, write_line};

/// Middleware writing an access line for every request and shipping a structured record of it.
///
/// Access lines go to the configured log file (standard output by default), prefixed with a
/// timestamp. Structured records are shipped in the background to the HTTP log endpoint or the
/// message broker, see [`route`](crate::route) for the selection rules.
///
/// `AccessLogger` is cheap to clone. Build it once and clone it into every worker's `App` so that
/// all workers share one writer.
///
/// # Examples
/// ```rust
/// use actix_web::App;
/// use actix_web_middleware_accesslog::{AccessLogger, Config};
///
/// let logger = AccessLogger::new(Config::default());
///
/// let app = App::new()
///     .wrap(logger.clone());
/// ```
#[derive(Clone)]
pub struct AccessLogger(Arc<Inner>);

#[derive(Clone)]
struct Inner {
    config: Arc<Config>,
    writer: SharedWriter,
    dispatcher: Dispatcher,
}

impl AccessLogger {
    /// Create `AccessLogger` middleware writing to `config.log_file`.
    pub fn new(config: impl Into<Arc<Config>>) -> AccessLogger {
        let config = config.into();
        let writer = TimestampWriter::new(open_log_sink(&config.log_file), config.utc);
        AccessLogger(Arc::new(Inner {
            dispatcher: Dispatcher::new(config.clone()),
            writer: Arc::new(Mutex::new(writer)),
            config,
        }))
    }

    /// Replaces the byte sink access lines are written to. Lines are still timestamp-prefixed.
    pub fn writer<W: Write + Send + 'static>(self, sink: W) -> Self {
        let utc = self.0.config.utc;
        self.map_inner(|inner| inner.writer = Arc::new(Mutex::new(TimestampWriter::new(sink, utc))))
    }

    /// Shares a timestamp-prefixing writer with other loggers, all lines go through one lock.
    pub fn shared_writer<W: Write + Send + 'static>(
        self,
        writer: Arc<Mutex<TimestampWriter<W>>>,
    ) -> Self {
        let writer: SharedWriter = writer;
        self.map_inner(|inner| inner.writer = writer)
    }

    /// Sets the message broker client used when records are routed to the broker.
    pub fn broker(self, broker: Arc<dyn BrokerSink>) -> Self {
        self.map_inner(|inner| inner.dispatcher = inner.dispatcher.clone().with_broker(broker))
    }

    /// Sets the shipper used for the HTTP log endpoint.
    pub fn http_shipper(self, shipper: HttpLogShipper) -> Self {
        self.map_inner(|inner| {
            inner.dispatcher = inner.dispatcher.clone().with_http_shipper(shipper)
        })
    }

    fn map_inner(self, update: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.0);
        update(&mut inner);
        AccessLogger(Arc::new(inner))
    }

    /// Writes the access line and hands the structured record to the dispatcher.
    fn finish(&self, req: &RequestMeta, res: &ResponseMeta, start: OffsetDateTime) {
        let elapsed = OffsetDateTime::now_utc() - start;
        write_line(&self.0.writer, &access_line(req, res, elapsed));
        self.0
            .dispatcher
            .dispatch(LogRecord::with_elapsed(req, res, elapsed));
    }
}

impl Default for AccessLogger {
    /// Create `AccessLogger` middleware with the default configuration: local time stamps on
    /// standard output, no structured shipping.
    fn default() -> Self {
        AccessLogger::new(Config::default())
    }
}

impl std::fmt::Debug for AccessLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLogger")
            .field("config", &self.0.config)
            .field("dispatcher", &self.0.dispatcher)
            .finish_non_exhaustive()
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AccessLoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessLoggerMiddlewareService {
            service,
            logger: Rc::new(self.clone()),
        }))
    }
}

/// Access logger middleware service.
pub struct AccessLoggerMiddlewareService<S> {
    logger: Rc<AccessLogger>,
    service: S,
}

impl<S, B> Service<ServiceRequest> for AccessLoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = AccessLoggerResponse<S, B>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let time = OffsetDateTime::now_utc();
        let meta = RequestMeta::from_request(req.request());

        AccessLoggerResponse {
            fut: self.service.call(req),
            time,
            meta: Some(meta),
            logger: Rc::clone(&self.logger),
            _phantom: PhantomData,
        }
    }
}

pin_project! {
    pub struct AccessLoggerResponse<S, B>
    where
        B: MessageBody,
        S: Service<ServiceRequest>,
    {
        #[pin]
        fut: S::Future,
        time: OffsetDateTime,
        meta: Option<RequestMeta>,
        logger: Rc<AccessLogger>,
        _phantom: PhantomData<B>,
    }
}

impl<S, B> Future for AccessLoggerResponse<S, B>
where
    B: MessageBody,
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    type Output = Result<ServiceResponse<B>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let result = ready!(this.fut.poll(cx));

        if let Some(mut meta) = this.meta.take() {
            let response = match &result {
                Ok(res) => {
                    meta.resolve_auth_method(res.request());
                    ResponseMeta::new(res.status(), res.headers())
                }
                Err(err) => {
                    // the error is turned into a response further up, log what it will become
                    let res = err.error_response();
                    ResponseMeta::new(res.status(), res.headers())
                }
            };
            this.logger.finish(&meta, &response, *this.time);
        }

        Poll::Ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuthMethod;
    use crate::tls::TlsInfo;
    use actix_web::{
        App, HttpMessage, HttpRequest, HttpResponse,
        dev::Service as _,
        error::ErrorForbidden,
        http::StatusCode,
        test::{self, TestRequest},
        web,
    };
    use futures_core::future::BoxFuture;
    use std::io;
    use std::time::Duration;
    use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ChannelBroker(UnboundedSender<Vec<u8>>);

    impl BrokerSink for ChannelBroker {
        fn send(&self, data: Vec<u8>) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                let _ = self.0.send(data);
            })
        }
    }

    async fn status() -> HttpResponse {
        HttpResponse::Ok()
            .insert_header(("response-time-seconds", "0.25"))
            .insert_header(("response-status", "200 OK"))
            .body("alive")
    }

    #[test]
    fn test_logger_builder() {
        let logger = AccessLogger::default();
        assert_eq!(*logger.0.config, Config::default());

        let capture = Capture::default();
        let (tx, _rx) = unbounded_channel();
        let logger = AccessLogger::new(Config {
            utc: true,
            ..Config::default()
        })
        .writer(capture.clone())
        .broker(Arc::new(ChannelBroker(tx)));

        assert!(logger.0.config.utc);
        assert!(format!("{:?}", logger.0.dispatcher).contains("broker: true"));

        write_line(&logger.0.writer, "line\n");
        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" UTC] line"));
    }

    #[test]
    fn test_shared_writer_keeps_prefix() {
        let capture = Capture::default();
        let shared = Arc::new(Mutex::new(TimestampWriter::new(capture.clone(), true)));
        let first = AccessLogger::default().shared_writer(shared.clone());
        let second = AccessLogger::default().shared_writer(shared);

        write_line(&first.0.writer, "first\n");
        write_line(&second.0.writer, "second\n");

        let lines = capture.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with(" UTC] first"));
        assert!(lines[1].starts_with('[') && lines[1].ends_with(" UTC] second"));
    }

    #[actix_web::test]
    async fn test_plaintext_without_shipping() {
        let capture = Capture::default();
        let logger = AccessLogger::default().writer(capture.clone());
        let app = test::init_service(
            App::new()
                .wrap(logger)
                .route("/status", web::get().to(status)),
        )
        .await;

        let req = TestRequest::get()
            .uri("/status")
            .peer_addr("192.168.1.10:40000".parse().unwrap())
            .insert_header(("user-agent", "probe/1.0"))
            .to_request();
        let res = app.call(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.starts_with('['));
        assert!(line.contains(
            "] [client: ] [backend: 192.168.1.10:40000] GET /status HTTP/1.1 200 [data: 0 in "
        ));
        assert!(line.contains("[auth: No TLS None \"\" ]"));
        assert!(line.contains("[ref: \"-\" \"probe/1.0\"]"));
        assert!(line.contains("[req: "));
    }

    #[actix_web::test]
    async fn test_error_response_is_logged() {
        let capture = Capture::default();
        let logger = AccessLogger::default().writer(capture.clone());
        let app = test::init_service(App::new().wrap(logger).route(
            "/secret",
            web::get().to(|| async { Err::<HttpResponse, _>(ErrorForbidden("denied")) }),
        ))
        .await;

        let res = test::call_service(&app, TestRequest::get().uri("/secret").to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" GET /secret HTTP/1.1 403 "));
    }

    #[actix_web::test]
    async fn test_broker_shipping() {
        let capture = Capture::default();
        let (tx, mut rx) = unbounded_channel();
        let mut config = Config::default();
        config.stomp_config.endpoint = "mb:61313".to_owned();
        config.stomp_config.uri = "/topic/cms.auth".to_owned();

        let logger = AccessLogger::new(config)
            .writer(capture.clone())
            .broker(Arc::new(ChannelBroker(tx)));
        let app = test::init_service(App::new().wrap(logger).route(
            "/status",
            web::get().to(|req: HttpRequest| async move {
                // authentication runs inside the logged service
                req.extensions_mut()
                    .insert(AuthMethod("X509Cert".to_owned()));
                status().await
            }),
        ))
        .await;

        let req = TestRequest::get()
            .uri("/status")
            .insert_header(("referer", "https://cmsweb.cern.ch/"))
            .insert_header(("cms-authn-method", "header-value"))
            .to_request();
        test::call_service(&app, req).await;

        let data = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let record: LogRecord = serde_json::from_slice(&data).unwrap();
        assert_eq!(record.method, "GET");
        assert_eq!(record.uri, "/status");
        assert_eq!(record.status, 200);
        assert_eq!(record.referer, "https://cmsweb.cern.ch/");
        assert_eq!(record.cms_auth, "X509Cert");
        assert_eq!(record.response_time, 0.25);
        assert_eq!(record.response_status, "200 OK");
        assert!(record.request_time >= 0.0);
        assert!(rx.try_recv().is_err());

        assert_eq!(capture.lines().len(), 1);
    }

    #[actix_web::test]
    async fn test_tls_request_http_shipping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.stomp_config.endpoint = "mb:61313".to_owned();
        config.stomp_config.uri = "/topic/cms.auth".to_owned();
        config.logs_http_endpoint = server.uri();
        config.logs_http_producer = "frontend".to_owned();

        let (tx, mut rx) = unbounded_channel();
        let capture = Capture::default();
        let logger = AccessLogger::new(config)
            .writer(capture.clone())
            .broker(Arc::new(ChannelBroker(tx)));
        let app = test::init_service(
            App::new()
                .wrap(logger)
                .wrap_fn(|req, srv| {
                    // stands in for the connection data of a TLS 1.3 listener
                    req.extensions_mut().insert(TlsInfo {
                        version: 0x0304,
                        cipher_suite: 0x1302,
                    });
                    srv.call(req)
                })
                .route("/status", web::get().to(status)),
        )
        .await;

        let req = TestRequest::get().uri("/status").to_request();
        test::call_service(&app, req).await;

        let mut requests = Vec::new();
        for _ in 0..100 {
            requests = server.received_requests().await.unwrap_or_default();
            if !requests.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(requests.len(), 1);

        let envelope: crate::record::HttpRecord =
            serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(envelope.producer, "frontend");
        assert_eq!(envelope.kind, "cms");
        assert_eq!(envelope.type_prefix, "raw");
        assert_eq!(envelope.data.auth_proto, "TLS13");
        assert_eq!(envelope.data.cipher, "TLS_AES_256_GCM_SHA384");
        assert!(rx.try_recv().is_err());

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[auth: TLS13 TLS_AES_256_GCM_SHA384 \"\" ]"));
    }
}
