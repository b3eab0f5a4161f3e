#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bevy_chat_stream::{
    ApiError, ChatClient, ChatClientConfig, ChatNotice, ChatRequestBody, ChatTransport,
    ConversationApi, ConversationDetail, ConversationId, ConversationSummary, Message,
    TransportError, TransportResponse,
};

/// body that hands out one scripted chunk per read.
pub struct ChunkedBody {
    chunks: VecDeque<Vec<u8>>,
}

impl ChunkedBody {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
        }
    }
}

impl Read for ChunkedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

/// body fed by the test at its own pace; ends when the sender is dropped,
/// fails when an `Err` is sent.
pub struct ChannelBody {
    rx: flume::Receiver<io::Result<Vec<u8>>>,
    leftover: Vec<u8>,
}

impl Read for ChannelBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.leftover.is_empty() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => self.leftover = chunk,
                Ok(Err(err)) => return Err(err),
                Err(_) => return Ok(0),
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

pub fn channel_body() -> (flume::Sender<io::Result<Vec<u8>>>, ChannelBody) {
    let (tx, rx) = flume::unbounded();
    (tx, ChannelBody { rx, leftover: Vec::new() })
}

pub fn delta(text: &str) -> Vec<u8> {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
    .into_bytes()
}

/// transport answering each request with the next scripted response and
/// recording the request bodies.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<Result<TransportResponse, TransportError>>>>,
    pub requests: Arc<Mutex<Vec<ChatRequestBody>>>,
}

impl ScriptedTransport {
    pub fn respond(&self, status: u16, body: impl Read + Send + 'static) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TransportResponse::new(status, body)));
    }

    pub fn fail(&self, err: TransportError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<ChatRequestBody> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatTransport for ScriptedTransport {
    fn open(&self, request: &ChatRequestBody) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no scripted response".into())))
    }
}

/// in-memory conversation store.
#[derive(Default)]
pub struct MemoryApi {
    pub conversations: Mutex<Vec<ConversationDetail>>,
    pub fail_list: Mutex<bool>,
    pub list_calls: Mutex<usize>,
}

impl MemoryApi {
    pub fn with(details: Vec<ConversationDetail>) -> Self {
        Self {
            conversations: Mutex::new(details),
            ..Self::default()
        }
    }
}

pub fn detail(id: &str, title: &str, messages: Vec<Message>) -> ConversationDetail {
    ConversationDetail {
        summary: ConversationSummary {
            id: id.into(),
            title: title.into(),
            model: "m".into(),
            created_at: None,
            updated_at: None,
            has_summary: None,
            total_tokens: None,
        },
        messages,
    }
}

impl ConversationApi for MemoryApi {
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        *self.list_calls.lock().unwrap() += 1;
        if *self.fail_list.lock().unwrap() {
            return Err(ApiError::Status {
                status: 500,
                message: "list unavailable".into(),
            });
        }
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.summary.clone())
            .collect())
    }

    fn get_conversation(&self, id: &ConversationId) -> Result<ConversationDetail, ApiError> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|d| &d.summary.id == id)
            .cloned()
            .ok_or(ApiError::Status {
                status: 404,
                message: "Conversation not found".into(),
            })
    }

    fn create_conversation(
        &self,
        title: Option<&str>,
        _model: Option<&str>,
    ) -> Result<ConversationSummary, ApiError> {
        let mut all = self.conversations.lock().unwrap();
        let d = detail(&format!("c{}", all.len() + 1), title.unwrap_or("New chat"), vec![]);
        all.push(d.clone());
        Ok(d.summary)
    }

    fn update_conversation(
        &self,
        id: &ConversationId,
        title: &str,
    ) -> Result<ConversationSummary, ApiError> {
        let mut all = self.conversations.lock().unwrap();
        let d = all
            .iter_mut()
            .find(|d| &d.summary.id == id)
            .ok_or(ApiError::Status { status: 404, message: "missing".into() })?;
        d.summary.title = title.to_string();
        Ok(d.summary.clone())
    }

    fn delete_conversation(&self, id: &ConversationId) -> Result<(), ApiError> {
        self.conversations
            .lock()
            .unwrap()
            .retain(|d| &d.summary.id != id);
        Ok(())
    }
}

pub fn client(transport: &ScriptedTransport, rt: &tokio::runtime::Runtime) -> ChatClient {
    client_with(transport, rt, ChatClientConfig::default())
}

pub fn client_with(
    transport: &ScriptedTransport,
    rt: &tokio::runtime::Runtime,
    config: ChatClientConfig,
) -> ChatClient {
    ChatClient::new(config, Arc::new(transport.clone()), rt.handle().clone())
}

/// pump until `done` holds, collecting notices. panics after five seconds.
pub fn pump_until(
    client: &mut ChatClient,
    mut done: impl FnMut(&ChatClient, &[ChatNotice]) -> bool,
) -> Vec<ChatNotice> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut notices = Vec::new();
    loop {
        notices.extend(client.pump());
        if done(client, &notices) {
            return notices;
        }
        assert!(Instant::now() < deadline, "timed out; notices so far: {notices:?}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// pump for a short while, returning whatever arrived.
pub fn pump_for(client: &mut ChatClient, window: Duration) -> Vec<ChatNotice> {
    let deadline = Instant::now() + window;
    let mut notices = Vec::new();
    while Instant::now() < deadline {
        notices.extend(client.pump());
        std::thread::sleep(Duration::from_millis(2));
    }
    notices
}

pub fn idle(client: &ChatClient, _: &[ChatNotice]) -> bool {
    !client.is_streaming()
}
