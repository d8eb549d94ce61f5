//! Recording `ChatApi` used by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use super::{ChatApi, Keyboard, MediaMessage, MemberStatus, PaidMedia};
use crate::catalog::ContentKind;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Text {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Media {
        chat_id: i64,
        kind: ContentKind,
        file_id: String,
        caption: String,
        protect_content: bool,
    },
    PaidMedia {
        chat_id: i64,
        kind: ContentKind,
        file_id: String,
        caption: String,
        star_count: u32,
        payload: String,
        protect_content: bool,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
    },
    Member {
        chat_id: i64,
        user_id: i64,
    },
    PreCheckout {
        query_id: String,
        ok: bool,
    },
}

pub struct FakeChatApi {
    calls: Mutex<Vec<Call>>,
    next_message_id: AtomicI64,
    members: Mutex<HashMap<i64, MemberStatus>>,
    /// Chats for which every send fails.
    failing_chats: Mutex<HashSet<i64>>,
    fail_member_lookup: Mutex<bool>,
    fail_deletes: Mutex<bool>,
    /// Fail photo/audio/video sends, free or paid, while text still goes through.
    fail_media: Mutex<bool>,
}

impl FakeChatApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(1000),
            members: Mutex::new(HashMap::new()),
            failing_chats: Mutex::new(HashSet::new()),
            fail_member_lookup: Mutex::new(false),
            fail_deletes: Mutex::new(false),
            fail_media: Mutex::new(false),
        }
    }

    pub fn set_member(&self, user_id: i64, status: MemberStatus) {
        self.members.lock().unwrap().insert(user_id, status);
    }

    pub fn fail_sends_to(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn fail_member_lookup(&self) {
        *self.fail_member_lookup.lock().unwrap() = true;
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }

    pub fn fail_media(&self) {
        *self.fail_media.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Text { chat_id: id, text, .. } if id == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<(i64, i64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete {
                    chat_id,
                    message_id,
                } => Some((chat_id, message_id)),
                _ => None,
            })
            .collect()
    }

    pub fn last_message_id(&self) -> i64 {
        self.next_message_id.load(Ordering::SeqCst) - 1
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn send_result(&self, method: &'static str, chat_id: i64) -> Result<i64> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(Error::remote(method, "Forbidden: bot was blocked by the user"));
        }
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    fn media_result(&self, method: &'static str, chat_id: i64) -> Result<i64> {
        if *self.fail_media.lock().unwrap() {
            return Err(Error::remote(method, "Bad Request: wrong file identifier"));
        }
        self.send_result(method, chat_id)
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<i64> {
        self.record(Call::Text {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        self.send_result("sendMessage", chat_id)
    }

    async fn send_media(&self, chat_id: i64, media: MediaMessage<'_>) -> Result<i64> {
        self.record(Call::Media {
            chat_id,
            kind: media.kind,
            file_id: media.file_id.to_string(),
            caption: media.caption.to_string(),
            protect_content: media.protect_content,
        });
        self.media_result("sendMedia", chat_id)
    }

    async fn send_paid_media(&self, chat_id: i64, media: PaidMedia<'_>) -> Result<i64> {
        self.record(Call::PaidMedia {
            chat_id,
            kind: media.kind,
            file_id: media.file_id.to_string(),
            caption: media.caption.to_string(),
            star_count: media.star_count,
            payload: media.payload,
            protect_content: media.protect_content,
        });
        self.media_result("sendPaidMedia", chat_id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.record(Call::Delete {
            chat_id,
            message_id,
        });
        if *self.fail_deletes.lock().unwrap() {
            return Err(Error::remote("deleteMessage", "message to delete not found"));
        }
        Ok(())
    }

    async fn get_chat_member(&self, chat_id: i64, user_id: i64) -> Result<MemberStatus> {
        self.record(Call::Member { chat_id, user_id });
        if *self.fail_member_lookup.lock().unwrap() {
            return Err(Error::remote("getChatMember", "timed out"));
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or(MemberStatus::Left))
    }

    async fn answer_pre_checkout_query(&self, query_id: &str, ok: bool) -> Result<()> {
        self.record(Call::PreCheckout {
            query_id: query_id.to_string(),
            ok,
        });
        Ok(())
    }
}
