//! Per-event handler slots.
//!
//! Each event type has at most one handler; registering again replaces
//! the previous one. Handlers run on the dispatcher task, one at a time,
//! in frame order.
//!
//! Handlers are plain synchronous callbacks. Sending is async, so a
//! handler that wants to answer clones the session and spawns the send:
//!
//! ```no_run
//! # let session = dgg_chat::Session::new("key").unwrap();
//! session.handlers().on_private_message(|pm, session| {
//!     let session = session.clone();
//!     tokio::spawn(async move {
//!         let _ = session.send_private_message(pm.sender.nick, "hi").await;
//!     });
//! });
//! ```
//!
//! A handler that blocks stalls every later frame of the connection.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ChatError;
use crate::events::{
    Ban, Broadcast, Donation, ErrorNotice, Event, Message, Mute, Names, Pin, Ping,
    PrivateMessage, RoomAction, SubOnly, Subscription, User,
};
use crate::session::Session;

/// Callback invoked with a decoded event and the session it arrived on.
///
/// Runs inline on the dispatcher; see the module docs for replying.
pub type Handler<T> = Arc<dyn Fn(T, &Session) + Send + Sync>;

/// Callback for connection-level failures.
pub type ErrorHandler = Arc<dyn Fn(&ChatError, &Session) + Send + Sync>;

#[derive(Default)]
struct Slots {
    message: Option<Handler<Message>>,
    pin: Option<Handler<Pin>>,
    names: Option<Handler<Names>>,
    mute: Option<Handler<Mute>>,
    unmute: Option<Handler<Mute>>,
    ban: Option<Handler<Ban>>,
    unban: Option<Handler<Ban>>,
    join: Option<Handler<RoomAction>>,
    quit: Option<Handler<RoomAction>>,
    user_update: Option<Handler<User>>,
    private_message: Option<Handler<PrivateMessage>>,
    broadcast: Option<Handler<Broadcast>>,
    subscription: Option<Handler<Subscription>>,
    donation: Option<Handler<Donation>>,
    pong: Option<Handler<Ping>>,
    sub_only: Option<Handler<SubOnly>>,
    error_notice: Option<Handler<ErrorNotice>>,
    socket_error: Option<ErrorHandler>,
}

/// Registry of event handlers, shared by every connection of a session.
#[derive(Default)]
pub struct HandlerRegistry {
    slots: RwLock<Slots>,
}

fn invoke<T>(handler: Option<Handler<T>>, value: T, session: &Session) -> bool {
    match handler {
        Some(handler) => {
            handler(value, session);
            true
        }
        None => false,
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clones a slot out so the lock is released before the handler runs.
    fn slot<H>(&self, pick: impl FnOnce(&Slots) -> Option<H>) -> Option<H> {
        let slots = self.read();
        pick(&*slots)
    }

    pub fn on_message(&self, f: impl Fn(Message, &Session) + Send + Sync + 'static) {
        self.write().message = Some(Arc::new(f));
    }

    pub fn on_pin(&self, f: impl Fn(Pin, &Session) + Send + Sync + 'static) {
        self.write().pin = Some(Arc::new(f));
    }

    pub fn on_names(&self, f: impl Fn(Names, &Session) + Send + Sync + 'static) {
        self.write().names = Some(Arc::new(f));
    }

    pub fn on_mute(&self, f: impl Fn(Mute, &Session) + Send + Sync + 'static) {
        self.write().mute = Some(Arc::new(f));
    }

    pub fn on_unmute(&self, f: impl Fn(Mute, &Session) + Send + Sync + 'static) {
        self.write().unmute = Some(Arc::new(f));
    }

    pub fn on_ban(&self, f: impl Fn(Ban, &Session) + Send + Sync + 'static) {
        self.write().ban = Some(Arc::new(f));
    }

    pub fn on_unban(&self, f: impl Fn(Ban, &Session) + Send + Sync + 'static) {
        self.write().unban = Some(Arc::new(f));
    }

    pub fn on_join(&self, f: impl Fn(RoomAction, &Session) + Send + Sync + 'static) {
        self.write().join = Some(Arc::new(f));
    }

    pub fn on_quit(&self, f: impl Fn(RoomAction, &Session) + Send + Sync + 'static) {
        self.write().quit = Some(Arc::new(f));
    }

    pub fn on_user_update(&self, f: impl Fn(User, &Session) + Send + Sync + 'static) {
        self.write().user_update = Some(Arc::new(f));
    }

    pub fn on_private_message(
        &self,
        f: impl Fn(PrivateMessage, &Session) + Send + Sync + 'static,
    ) {
        self.write().private_message = Some(Arc::new(f));
    }

    pub fn on_broadcast(&self, f: impl Fn(Broadcast, &Session) + Send + Sync + 'static) {
        self.write().broadcast = Some(Arc::new(f));
    }

    pub fn on_subscription(&self, f: impl Fn(Subscription, &Session) + Send + Sync + 'static) {
        self.write().subscription = Some(Arc::new(f));
    }

    pub fn on_donation(&self, f: impl Fn(Donation, &Session) + Send + Sync + 'static) {
        self.write().donation = Some(Arc::new(f));
    }

    pub fn on_pong(&self, f: impl Fn(Ping, &Session) + Send + Sync + 'static) {
        self.write().pong = Some(Arc::new(f));
    }

    pub fn on_sub_only(&self, f: impl Fn(SubOnly, &Session) + Send + Sync + 'static) {
        self.write().sub_only = Some(Arc::new(f));
    }

    pub fn on_error_notice(&self, f: impl Fn(ErrorNotice, &Session) + Send + Sync + 'static) {
        self.write().error_notice = Some(Arc::new(f));
    }

    /// Called for read failures and for each failed reconnect attempt.
    pub fn on_socket_error(&self, f: impl Fn(&ChatError, &Session) + Send + Sync + 'static) {
        self.write().socket_error = Some(Arc::new(f));
    }

    /// Hands the event to its handler. Returns false if no handler is set.
    pub(crate) fn deliver(&self, event: Event, session: &Session) -> bool {
        match event {
            Event::Message(e) => invoke(self.slot(|s| s.message.clone()), e, session),
            Event::Pin(e) => invoke(self.slot(|s| s.pin.clone()), e, session),
            Event::Names(e) => invoke(self.slot(|s| s.names.clone()), e, session),
            Event::Mute(e) => invoke(self.slot(|s| s.mute.clone()), e, session),
            Event::Unmute(e) => invoke(self.slot(|s| s.unmute.clone()), e, session),
            Event::Ban(e) => invoke(self.slot(|s| s.ban.clone()), e, session),
            Event::Unban(e) => invoke(self.slot(|s| s.unban.clone()), e, session),
            Event::Join(e) => invoke(self.slot(|s| s.join.clone()), e, session),
            Event::Quit(e) => invoke(self.slot(|s| s.quit.clone()), e, session),
            Event::UserUpdate(e) => invoke(self.slot(|s| s.user_update.clone()), e, session),
            Event::PrivateMessage(e) => {
                invoke(self.slot(|s| s.private_message.clone()), e, session)
            }
            Event::Broadcast(e) => invoke(self.slot(|s| s.broadcast.clone()), e, session),
            Event::Subscription(e) => invoke(self.slot(|s| s.subscription.clone()), e, session),
            Event::Donation(e) => invoke(self.slot(|s| s.donation.clone()), e, session),
            Event::Pong(e) => invoke(self.slot(|s| s.pong.clone()), e, session),
            Event::SubOnly(e) => invoke(self.slot(|s| s.sub_only.clone()), e, session),
            Event::Error(e) => invoke(self.slot(|s| s.error_notice.clone()), e, session),
        }
    }

    pub(crate) fn socket_error(&self, err: &ChatError, session: &Session) -> bool {
        match self.slot(|s| s.socket_error.clone()) {
            Some(handler) => {
                handler(err, session);
                true
            }
            None => false,
        }
    }
}
