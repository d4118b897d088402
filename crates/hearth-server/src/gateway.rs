use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use hearth_api::{ApiError, AuthOutcome, AuthService, MessageRouter};
use hearth_crypto::HandshakeKey;
use hearth_db::Database;
use hearth_gateway::frame::{self, FrameError};
use hearth_gateway::{ConnectionId, Delivery, Outbox, Seal, Session, SessionRegistry};
use hearth_types::api::{AuthError, LoginSuccess, Process, RequestError};
use hearth_types::clock::{Clock, SystemClock};
use hearth_types::events::{Frame, Request, ServerEvent};

const INTERNAL_FAILURE: &str = "Internal server error. Try again later.";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Owns the one process-wide instance of every component and binds
/// inbound frames to them. Cloning shares the same gateway.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    sessions: SessionRegistry,
    outbox: Outbox,
    auth: AuthService,
    router: MessageRouter,
    handshake_key: HandshakeKey,
}

impl Gateway {
    pub fn new(db: Arc<Database>, handshake_key: HandshakeKey) -> Self {
        Self::with_clock(db, handshake_key, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Arc<Database>, handshake_key: HandshakeKey, clock: Arc<dyn Clock>) -> Self {
        let sessions = SessionRegistry::with_clock(clock.clone());
        Self {
            inner: Arc::new(GatewayInner {
                auth: AuthService::new(db.clone(), sessions.clone(), clock),
                router: MessageRouter::new(db, sessions.clone()),
                sessions,
                outbox: Outbox::new(),
                handshake_key,
            }),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Register a new connection. Frames for it arrive on the receiver.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Frame>) {
        let (connection_id, rx) = self.inner.outbox.register();
        info!("Connected {} ({} live connections)", connection_id, self.inner.outbox.len());
        (connection_id, rx)
    }

    pub fn disconnect(&self, connection_id: ConnectionId) {
        // Outbox first: a login finishing concurrently checks it afterwards.
        self.inner.outbox.unregister(connection_id);
        let live = self.inner.outbox.len();
        match self.inner.sessions.remove(connection_id) {
            Some(session) => info!(
                "Disconnected {} ({} / {}), {} live connections",
                connection_id, session.user.username, session.user.id, live
            ),
            None => info!("Disconnected {}, {} live connections", connection_id, live),
        }
    }

    /// Decrypt, dispatch and answer one inbound frame. Every failure is
    /// contained to this frame; the connection stays usable.
    pub fn handle_frame(&self, connection_id: ConnectionId, frame: &Frame) {
        let deliveries = match self.open(connection_id, frame) {
            Ok(Some((request, caller))) => {
                let name = request.name();
                self.dispatch(connection_id, caller.as_ref(), request)
                    .unwrap_or_else(|e| self.failure(connection_id, caller.as_ref(), name, e.into()))
            }
            Ok(None) => {
                debug!("dropping {} from unauthenticated {}", frame.event, connection_id);
                return;
            }
            Err(e) => self.failure(connection_id, None, &frame.event, e),
        };
        self.deliver(deliveries);

        if !self.inner.outbox.contains(connection_id) {
            // The connection went away while this frame was in flight.
            self.inner.sessions.remove(connection_id);
        }
    }

    /// Pick the key for a frame and decrypt it. `None` means the frame needs
    /// a session and the connection has none.
    fn open(
        &self,
        connection_id: ConnectionId,
        frame: &Frame,
    ) -> Result<Option<(Request, Option<Session>)>, GatewayError> {
        if Request::is_handshake(&frame.event) {
            let request = frame::open(self.inner.handshake_key.as_bytes(), frame)?;
            return Ok(Some((request, None)));
        }

        let Some(session) = self.inner.sessions.get(connection_id) else {
            return Ok(None);
        };
        let request = frame::open(session.key.as_bytes(), frame)?;
        Ok(Some((request, Some(session))))
    }

    /// The single entry point for every request kind.
    pub fn dispatch(
        &self,
        connection_id: ConnectionId,
        caller: Option<&Session>,
        request: Request,
    ) -> Result<Vec<Delivery>, ApiError> {
        let inner = &self.inner;
        match (request, caller) {
            (Request::Login(creds), _) => {
                let outcome = inner.auth.login(connection_id, &creds)?;
                Ok(vec![auth_reply(connection_id, outcome)])
            }
            (Request::Register(creds), _) => {
                let outcome = inner.auth.register(connection_id, &creds)?;
                Ok(vec![auth_reply(connection_id, outcome)])
            }

            // Everything below needs a session; without one, say nothing.
            (_, None) => Ok(Vec::new()),

            (Request::Message(msg), Some(caller)) => inner.router.route(caller, msg),
            (Request::GetMessages(req), Some(caller)) => Ok(vec![inner.router.history(caller, req.chat_id)?]),
            (Request::GetChannels(_), Some(caller)) => Ok(vec![inner.router.channels(caller)?]),
            (Request::GetUsers(_), Some(caller)) => Ok(vec![inner.router.users(caller)?]),
            (Request::Logout(_), Some(caller)) => {
                inner.sessions.remove(connection_id);
                info!("{} ({}) logged out on {}", caller.user.username, caller.user.id, connection_id);
                Ok(Vec::new())
            }
        }
    }

    /// Decide what, if anything, the caller hears about a failed request.
    fn failure(
        &self,
        connection_id: ConnectionId,
        caller: Option<&Session>,
        request: &str,
        err: GatewayError,
    ) -> Vec<Delivery> {
        let reply = |description: &str| -> Vec<Delivery> {
            caller
                .map(|c| Delivery::to_session(c, request_error(description)))
                .into_iter()
                .collect()
        };

        match err {
            GatewayError::Frame(e) => {
                warn!("{} sent a bad {} frame: {}", connection_id, request, e);
                Vec::new()
            }
            GatewayError::Api(ApiError::UnknownRecipient(id)) => {
                warn!("{} tried to message unknown user {}", connection_id, id);
                reply("Recipient does not exist.")
            }
            GatewayError::Api(ApiError::Store(e)) => {
                error!("{} from {} failed in storage: {}", request, connection_id, e);
                match request {
                    Request::LOGIN => vec![Delivery::handshake(
                        connection_id,
                        ServerEvent::FailedLogin(AuthError::login(INTERNAL_FAILURE)),
                    )],
                    Request::REGISTER => vec![Delivery::handshake(
                        connection_id,
                        ServerEvent::FailedRegistration(AuthError::registration(INTERNAL_FAILURE)),
                    )],
                    _ => reply(INTERNAL_FAILURE),
                }
            }
        }
    }

    /// Seal each delivery with its recipient's key and queue it.
    fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            let key = match &delivery.seal {
                Seal::Handshake => self.inner.handshake_key.as_bytes(),
                Seal::Session(key) => key.as_bytes(),
            };
            match frame::seal(key, &delivery.event) {
                Ok(frame) => {
                    self.inner.outbox.send(delivery.connection_id, frame);
                }
                Err(e) => warn!("could not seal event for {}: {}", delivery.connection_id, e),
            }
        }
    }
}

fn auth_reply(connection_id: ConnectionId, outcome: AuthOutcome) -> Delivery {
    let event = match outcome {
        AuthOutcome::Authenticated(session) => ServerEvent::Login(LoginSuccess {
            session_key: session.key.to_base64(),
            user: session.user,
        }),
        AuthOutcome::Rejected(err) => match err.process {
            Process::Login => ServerEvent::FailedLogin(err),
            Process::Registration => ServerEvent::FailedRegistration(err),
        },
    };
    Delivery::handshake(connection_id, event)
}

fn request_error(description: &str) -> ServerEvent {
    ServerEvent::Error(RequestError {
        description: description.to_string(),
    })
}
