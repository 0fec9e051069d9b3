//! A loopback auth backend speaking the RPC frame protocol.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use waypost::prelude::*;
use waypost_protocol::{RpcReply, RpcRequest};

struct Account {
    password: String,
    identity: Value,
}

#[derive(Default)]
struct Db {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, Value>,
    next_user: u64,
    next_session: u64,
}

#[derive(Default)]
struct Shared {
    db: Mutex<Db>,
    connections: AtomicUsize,
    requests: AtomicUsize,
    /// Answer every request with an `error` frame.
    failing: AtomicBool,
}

/// Mock backend with one seeded account, `a@b.com` / `pw`.
#[derive(Clone)]
pub struct MockBackend {
    pub url: String,
    shared: Arc<Shared>,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let shared = Arc::new(Shared::default());
        {
            let mut db = shared.db.lock().unwrap();
            db.add_account("a", "a@b.com", "pw");
        }
        let accept = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, Arc::clone(&accept)));
            }
        });
        Self { url, shared }
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    /// Drops every issued session, as if they all timed out.
    pub fn expire_sessions(&self) {
        self.shared.db.lock().unwrap().sessions.clear();
    }
}

impl Db {
    fn add_account(&mut self, username: &str, email: &str, password: &str) {
        self.next_user += 1;
        let identity = json!({
            "id": self.next_user,
            "email": email,
            "username": username,
            "isAdmin": false,
        });
        self.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity,
            },
        );
    }

    fn handle(&mut self, method: &str, params: &[Value]) -> CallResult {
        let arg = |i: usize| params.get(i).and_then(Value::as_str).unwrap_or("");
        match method {
            "auth.signin" => {
                let Some(account) = self.accounts.get(arg(0)) else {
                    return CallResult::rejected("Invalid credentials");
                };
                if account.password != arg(1) {
                    return CallResult::rejected("Invalid credentials");
                }
                self.next_session += 1;
                let mut identity = account.identity.clone();
                identity["sessionId"] = json!(format!("s{}", self.next_session));
                let token = format!("tok-{}", self.next_session);
                self.sessions.insert(token.clone(), identity.clone());
                identity["token"] = json!(token);
                CallResult::new(CallStatus::Logged, identity)
            }
            "auth.register" => {
                let (username, email, password) = (arg(0), arg(1), arg(2));
                if username.is_empty() || email.is_empty() || password.is_empty() {
                    return CallResult::rejected("All fields are required");
                }
                if self.accounts.contains_key(email) {
                    return CallResult::rejected("Email already registered");
                }
                self.add_account(username, email, password);
                CallResult::new(CallStatus::Fulfilled, json!("Account created"))
            }
            "auth.signout" => match self.sessions.remove(arg(0)) {
                Some(_) => CallResult::new(CallStatus::Fulfilled, Value::Null),
                None => CallResult::rejected("Not signed in"),
            },
            "auth.restore" => match self.sessions.get(arg(0)) {
                Some(identity) => CallResult::new(CallStatus::Logged, identity.clone()),
                None => CallResult::new(CallStatus::Invalid, Value::Null),
            },
            other => CallResult::rejected(format!("unknown method {other}")),
        }
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    while let Some(Ok(msg)) = source.next().await {
        let Message::Text(text) = msg else { continue };
        let request: RpcRequest = serde_json::from_str(text.as_str()).unwrap();
        shared.requests.fetch_add(1, Ordering::SeqCst);
        let reply = if shared.failing.load(Ordering::SeqCst) {
            RpcReply {
                id: request.id,
                result: None,
                error: Some("database unavailable".into()),
            }
        } else {
            let result = shared
                .db
                .lock()
                .unwrap()
                .handle(&request.method, &request.params);
            RpcReply {
                id: request.id,
                result: Some(result),
                error: None,
            }
        };
        let text = serde_json::to_string(&reply).unwrap();
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

/// A `ws://` URL nothing is listening on.
pub async fn dead_backend_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}")
}

/// A gateway bound to an ephemeral port in front of `backend_url`.
pub async fn gateway(backend_url: &str) -> Gateway {
    Gateway::builder()
        .bind("127.0.0.1:0")
        .backend_url(backend_url)
        .build()
        .await
        .expect("gateway should bind")
}
