//! Shared utilities for the interceptor integration tests.
#![allow(dead_code)]

use std::any::Any;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rpc_interceptors::call::{CallContext, CallMeta, StreamRequest, UnaryRequest};
use rpc_interceptors::observability::logging::{Field, Level, Logger};
use rpc_interceptors::reporter::{Reporter, ServerReportable};
use rpc_interceptors::status::{Code, Status};
use rpc_interceptors::tags::{TagValues, Tags};

/// One reporter lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started(String),
    Received(String),
    ReceiveFailed(Code),
    Sent(String),
    SendFailed(Code),
    Completed(Option<Code>),
}

#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
    final_tags: Arc<Mutex<Vec<TagValues>>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Tag Bag snapshots taken in `post_call`, one per completed call.
    pub fn final_tags(&self) -> Vec<TagValues> {
        self.final_tags.lock().unwrap().clone()
    }

    pub fn completions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Completed(_)))
            .count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Reportable recording every lifecycle event into an [`EventLog`].
#[derive(Clone, Default)]
pub struct RecordingReportable {
    pub log: EventLog,
}

impl ServerReportable for RecordingReportable {
    fn server_reporter(&self, call: &CallMeta, ctx: CallContext) -> (Box<dyn Reporter>, CallContext) {
        self.log.push(Event::Started(call.full_method()));
        let reporter = RecordingReporter {
            log: self.log.clone(),
            tags: ctx.tags().clone(),
        };
        (Box::new(reporter), ctx)
    }
}

struct RecordingReporter {
    log: EventLog,
    tags: Tags,
}

impl Reporter for RecordingReporter {
    fn post_msg_send(&mut self, msg: Option<&dyn Any>, err: Option<&Status>, _: Duration) {
        match err {
            Some(status) => self.log.push(Event::SendFailed(status.code())),
            None => self.log.push(Event::Sent(describe(msg))),
        }
    }

    fn post_msg_receive(&mut self, msg: Option<&dyn Any>, err: Option<&Status>, _: Duration) {
        match err {
            Some(status) => self.log.push(Event::ReceiveFailed(status.code())),
            None => self.log.push(Event::Received(describe(msg))),
        }
    }

    fn post_call(&mut self, err: Option<&Status>, _: Duration) {
        self.log.final_tags.lock().unwrap().push(self.tags.values());
        self.log.push(Event::Completed(err.map(Status::code)));
    }
}

fn describe(msg: Option<&dyn Any>) -> String {
    match msg {
        Some(m) => m
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| m.downcast_ref::<u32>().map(|n| n.to_string()))
            .unwrap_or_else(|| "<opaque>".to_string()),
        None => "<none>".to_string(),
    }
}

/// Logger keeping every record in memory.
#[derive(Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<(Level, String, Vec<Field>)>>,
}

impl MemoryLogger {
    pub fn records(&self) -> Vec<(Level, String, Vec<Field>)> {
        self.records.lock().unwrap().clone()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        self.records
            .lock()
            .unwrap()
            .push((level, message.to_string(), fields.to_vec()));
    }
}

/// Value of the last field named `key`.
pub fn field<'a>(fields: &'a [Field], key: &str) -> Option<&'a rpc_interceptors::TagValue> {
    fields.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Unary echo handler.
///
/// `"fail"` fails with InvalidArgument, `"panic"` panics, `"hang"` never
/// finishes. Every call sets `custom.string` twice and `custom.int` once.
pub async fn echo(request: UnaryRequest<String>) -> Result<String, Status> {
    let UnaryRequest { ctx, message, .. } = request;
    ctx.tags().set("custom.string", "x").set("custom.int", 5);
    ctx.tags().set("custom.string", "y");

    match message.as_str() {
        "fail" => Err(Status::invalid_argument("refusing to echo fail")),
        "panic" => panic!("echo handler panicked"),
        "hang" => {
            futures_util::future::pending::<()>().await;
            unreachable!()
        }
        _ => Ok(format!("echo: {}", message)),
    }
}

/// Bidi echo handler: one upper-cased reply per inbound message.
pub async fn chat(request: StreamRequest<String, String>) -> Result<(), Status> {
    let StreamRequest { ctx, mut stream, .. } = request;
    let mut count: u64 = 0;
    while let Some(message) = stream.recv_msg().await? {
        count += 1;
        stream.send_msg(&message.to_uppercase()).await?;
    }
    ctx.tags().set("chat.messages", count);
    Ok(())
}

/// Server-stream handler: ignores input and sends `n` numbered replies.
pub async fn countdown(request: StreamRequest<u32, u32>) -> Result<(), Status> {
    let StreamRequest { mut stream, .. } = request;
    let n = stream.recv_msg().await?.unwrap_or(0);
    for i in (0..n).rev() {
        stream.send_msg(&i).await?;
    }
    Ok(())
}

/// Writer shared between a test and a `tracing_subscriber::fmt` subscriber.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a plain-text subscriber capturing every event into the returned buffer.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buf.contents())
}

/// Single-threaded runtime so thread-local recorders and subscribers apply.
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}
