use alloc::string::String;

use embedded_io_async::{Read, ReadReady, Write};

use log::{debug, info, warn};

use crate::auth::{AuthGate, AuthResult};
use crate::connectivity::LinkState;
use crate::error::{Error, Result};
use crate::framer::{Command, CommandFramer, FramingPolicy};
use crate::request::{DEFAULT_MAX_SECRET_LEN, RequestHead};
use crate::response::{DEFAULT_RESPONSE, Response};

// Bytes read from a client in a single call.
const READ_CHUNK_LEN: usize = 64;

/// Default number of consecutive polls a client may stay silent before its
/// connection is answered and closed.
pub const DEFAULT_MAX_IDLE_POLLS: u32 = 5000;

/// A listening socket serving one client connection at a time.
///
/// Reads and writes always refer to the connection accepted by the last
/// successful [`ClientSocket::poll_accept`] call.
#[allow(async_fn_in_trait)]
pub trait ClientSocket: Read + Write + ReadReady {
    /// Checks for a client connection without blocking.
    ///
    /// Returns `true` when a client is connected, either accepted by this
    /// call or by a previous one.
    async fn poll_accept(&mut self) -> core::result::Result<bool, Self::Error>;

    /// Closes the current client connection, if any, and starts listening
    /// for the next one.
    async fn close(&mut self);
}

/// The outcome of [`RequestListener::poll_for_client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerPoll {
    /// No client is connected.
    NoClient,
    /// A client is connected and its command is not complete yet.
    Receiving,
    /// A command has been framed. Its client waits for
    /// [`RequestListener::respond`], or for the next poll.
    CommandReady(Command),
    /// A command has been framed but the request was not authorized.
    Rejected(AuthResult),
    /// The client closed the connection before sending a command.
    Dropped,
    /// The client stayed silent for too long before sending a command.
    TimedOut,
}

enum Outcome {
    Pending,
    Framed(Command),
    Dropped,
    TimedOut,
}

/// Listens for clients and extracts one [`Command`] per connection.
///
/// Every accepted connection receives exactly one response and is then
/// closed, whatever its command is. While a connection is being read,
/// [`Self::command`] returns an empty string.
///
/// A client whose command has been framed is answered by
/// [`Self::respond`]. When no answer is given, the next
/// [`Self::poll_for_client`] call answers with the body set through
/// [`Self::set_response`].
pub struct RequestListener<C: ClientSocket> {
    socket: C,
    framer: CommandFramer,
    head: RequestHead,
    gate: Option<AuthGate>,
    response: String,
    reading: bool,
    awaiting: bool,
    idle_polls: u32,
    max_idle_polls: u32,
    last: Option<Command>,
}

impl<C: ClientSocket> RequestListener<C> {
    /// Creates a [`RequestListener`] framing commands with the given
    /// [`FramingPolicy`] and the default delimiter.
    #[must_use]
    pub fn new(socket: C, policy: FramingPolicy) -> Self {
        Self {
            socket,
            framer: CommandFramer::new(policy),
            head: RequestHead::default(),
            gate: None,
            response: DEFAULT_RESPONSE.into(),
            reading: false,
            awaiting: false,
            idle_polls: 0,
            max_idle_polls: DEFAULT_MAX_IDLE_POLLS,
            last: None,
        }
    }

    /// Sets the command delimiter.
    #[must_use]
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.framer = self.framer.delimiter(delimiter);
        self.head = self.head.delimiter(delimiter);
        self
    }

    /// Sets the maximum command payload length.
    #[must_use]
    pub fn max_command_len(mut self, max_len: usize) -> Self {
        self.framer = self.framer.max_len(max_len);
        self
    }

    /// Sets the number of consecutive polls a client may stay silent
    /// before its connection is answered and closed.
    #[must_use]
    pub fn max_idle_polls(mut self, max_polls: u32) -> Self {
        self.max_idle_polls = max_polls;
        self
    }

    /// Authorizes every framed command through the given [`AuthGate`].
    #[must_use]
    pub fn auth_gate(mut self, gate: AuthGate) -> Self {
        // Room for the secret followed by a line ending.
        let max_secret_len = (gate.secret().len() + 2).max(DEFAULT_MAX_SECRET_LEN);
        self.head = self.head.max_secret_len(max_secret_len);
        self.gate = Some(gate);
        self
    }

    /// Sets the default response body, sent to clients which are not
    /// answered through [`Self::respond`].
    pub fn set_response(&mut self, body: &str) {
        self.response = body.into();
    }

    /// Returns the last framed command.
    ///
    /// Returns an empty string while a client connection is being read, or
    /// when no command has been framed yet.
    #[must_use]
    pub fn command(&self) -> &str {
        if self.reading {
            return "";
        }
        self.last.as_ref().map_or("", Command::as_str)
    }

    /// Whether a client connection is being read.
    #[must_use]
    pub const fn is_reading(&self) -> bool {
        self.reading
    }

    /// Whether the client of the last framed command waits for a response.
    #[must_use]
    pub const fn awaits_response(&self) -> bool {
        self.awaiting
    }

    /// Returns a reference to the [`ClientSocket`].
    #[must_use]
    pub const fn socket(&self) -> &C {
        &self.socket
    }

    /// Answers the client of the last framed command with the given body,
    /// then closes its connection.
    ///
    /// Does nothing when no client waits for a response.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the response cannot be written. The connection is
    /// closed before the error is returned.
    pub async fn respond(&mut self, body: &str) -> Result<()> {
        if !self.awaiting {
            debug!("No client waits for a response");
            return Ok(());
        }

        self.reply(Response::ok(body)).await
    }

    /// Serves the current client, accepting a new one when none is
    /// connected.
    ///
    /// A client still waiting for its response is answered first with the
    /// default response body.
    ///
    /// Never blocks waiting for client bytes: a client sending nothing
    /// keeps its partial data until the next call, up to the idle limit.
    /// New clients are only accepted while the link is connected.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the client connection fails. The connection is
    /// closed before the error is returned.
    pub async fn poll_for_client(&mut self, state: LinkState) -> Result<ListenerPoll> {
        if self.awaiting {
            let response = Response::ok(&self.response);
            self.reply(response).await?;
        }

        if !self.reading {
            if !state.is_connected() {
                return Ok(ListenerPoll::NoClient);
            }

            if !self.socket.poll_accept().await.map_err(Error::io)? {
                return Ok(ListenerPoll::NoClient);
            }

            self.begin_session();
        }

        let outcome = match self.receive().await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.end_session().await;
                return Err(e);
            }
        };

        match outcome {
            Outcome::Pending => Ok(ListenerPoll::Receiving),
            Outcome::Framed(command) => self.answer(command, state).await,
            Outcome::Dropped => {
                warn!("Client closed the connection without sending a command");
                let response = Response::ok(&self.response);
                self.reply(response).await.map(|()| ListenerPoll::Dropped)
            }
            Outcome::TimedOut => {
                warn!("Client silent for {} polls, closing the connection", self.idle_polls);
                let response = Response::ok(&self.response);
                self.reply(response).await.map(|()| ListenerPoll::TimedOut)
            }
        }
    }

    fn begin_session(&mut self) {
        info!("Client connected");
        self.framer.reset();
        self.head.reset();
        self.reading = true;
        self.idle_polls = 0;
    }

    async fn end_session(&mut self) {
        self.socket.close().await;
        self.framer.reset();
        self.head.reset();
        self.reading = false;
        self.awaiting = false;
        self.idle_polls = 0;
    }

    async fn reply(&mut self, response: Response) -> Result<()> {
        let written = response.write(&mut self.socket).await.map_err(Error::io);
        self.end_session().await;
        written
    }

    async fn receive(&mut self) -> Result<Outcome> {
        let mut buf = [0u8; READ_CHUNK_LEN];
        let mut received = false;

        loop {
            if !self.socket.read_ready().map_err(Error::io)? {
                if let Some(command) = self.framer.drained() {
                    return Ok(Outcome::Framed(command));
                }

                if received {
                    self.idle_polls = 0;
                    return Ok(Outcome::Pending);
                }

                self.idle_polls += 1;
                if self.idle_polls < self.max_idle_polls {
                    return Ok(Outcome::Pending);
                }

                return Ok(self.framer.closed().map_or(Outcome::TimedOut, Outcome::Framed));
            }

            let len = self.socket.read(&mut buf).await.map_err(Error::io)?;
            if len == 0 {
                return Ok(self.framer.closed().map_or(Outcome::Dropped, Outcome::Framed));
            }
            received = true;

            for byte in &buf[..len] {
                self.head.push(*byte);
                if let Some(command) = self.framer.push(*byte) {
                    return Ok(Outcome::Framed(command));
                }
            }
        }
    }

    async fn answer(&mut self, command: Command, state: LinkState) -> Result<ListenerPoll> {
        if let Some(gate) = &self.gate {
            let result = gate.authorize(&self.head.request(), state, Some(&self.response));
            if !result.authorized {
                self.last = None;
                self.reply(Response::from(result.clone())).await?;
                return Ok(ListenerPoll::Rejected(result));
            }
        }

        debug!("Command ready: {command}");
        self.last = Some(command.clone());
        self.reading = false;
        self.awaiting = true;
        Ok(ListenerPoll::CommandReady(command))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::string::String;
    use std::vec;
    use std::vec::Vec;

    use crate::auth::AuthGate;
    use crate::connectivity::LinkState;
    use crate::error::Error;
    use crate::framer::FramingPolicy;
    use crate::tests::{ScriptedSocket, Step};

    use super::{ListenerPoll, RequestListener};

    const ENVELOPE_OK: &str =
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nOK\r\n";

    fn command(poll: ListenerPoll) -> String {
        match poll {
            ListenerPoll::CommandReady(command) => command.into_string(),
            poll => panic!("Expected a command, got {poll:?}"),
        }
    }

    fn leak(bytes: Vec<u8>) -> &'static [u8] {
        bytes.leak()
    }

    #[tokio::test]
    async fn test_no_client() {
        let mut listener = RequestListener::new(ScriptedSocket::default(), FramingPolicy::LineTerminated);

        assert_eq!(
            listener.poll_for_client(LinkState::Connected).await,
            Ok(ListenerPoll::NoClient)
        );
        assert_eq!(listener.command(), "");
    }

    #[tokio::test]
    async fn test_line_terminated_request() {
        let socket = ScriptedSocket::default().client(vec![
            Step::Send(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            Step::Send(b"!turn_on\n"),
        ]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated);

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();

        assert_eq!(command(poll), "!turn_on");
        assert_eq!(listener.command(), "!turn_on");
        assert!(listener.awaits_response());
        assert!(listener.socket().written.is_empty());

        listener.respond("OK").await.unwrap();

        assert!(!listener.awaits_response());
        assert_eq!(listener.socket().written_text(), ENVELOPE_OK);
        assert_eq!(listener.socket().closed, 1);
    }

    #[tokio::test]
    async fn test_response_reflects_the_command() {
        let socket = ScriptedSocket::default().client(vec![Step::Send(b"!on\n")]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated);
        listener.set_response("OFF");

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!on");
        listener.respond("ON").await.unwrap();

        assert!(listener.socket().written_text().ends_with("\r\n\r\nON\r\n"));

        // A second answer has no client left to go to.
        listener.respond("LATE").await.unwrap();
        assert!(!listener.socket().written_text().contains("LATE"));
        assert_eq!(listener.socket().closed, 1);
    }

    #[tokio::test]
    async fn test_unanswered_command_gets_default_response() {
        let socket = ScriptedSocket::default()
            .client(vec![Step::Send(b"!on\n")])
            .client(vec![Step::Send(b"!off\n")]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated);

        let _ = listener.poll_for_client(LinkState::Connected).await.unwrap();
        listener.set_response("IDLE");

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();

        assert_eq!(command(poll), "!off");
        assert_eq!(listener.socket().closed, 1);
        assert!(listener.socket().written_text().ends_with("\r\n\r\nIDLE\r\n"));
    }

    #[tokio::test]
    async fn test_pause_keeps_partial_data() {
        let socket = ScriptedSocket::default().client(vec![
            Step::Send(b"POST / HTTP/1.1\r\n\r\n!lamp"),
            Step::Pause,
            Step::Send(b" off\r\n"),
        ]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated);

        assert_eq!(
            listener.poll_for_client(LinkState::Connected).await,
            Ok(ListenerPoll::Receiving)
        );
        assert!(listener.is_reading());
        assert_eq!(listener.command(), "");
        assert!(listener.socket().written.is_empty());

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!lamp off");
        assert!(!listener.is_reading());
    }

    #[tokio::test]
    async fn test_drain_policy_completes_on_pause() {
        let socket = ScriptedSocket::default().client(vec![
            Step::Send(b"POST / HTTP/1.1\r\n\r\n"),
            Step::Pause,
            Step::Send(b"!dim 40"),
            Step::Pause,
        ]);
        let mut listener = RequestListener::new(socket, FramingPolicy::DelimiterDrain);

        assert_eq!(
            listener.poll_for_client(LinkState::Connected).await,
            Ok(ListenerPoll::Receiving)
        );

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!dim 40");
        assert!(listener.awaits_response());
    }

    #[tokio::test]
    async fn test_peer_close() {
        let socket = ScriptedSocket::default()
            .client(vec![Step::Send(b"!toggle"), Step::Close])
            .client(vec![Step::Send(b"GET / HTTP/1.1\r\n"), Step::Close]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated);

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!toggle");

        assert_eq!(
            listener.poll_for_client(LinkState::Connected).await,
            Ok(ListenerPoll::Dropped)
        );
        // A dropped connection keeps the last command.
        assert_eq!(listener.command(), "!toggle");
        assert_eq!(listener.socket().closed, 2);
        assert_eq!(listener.socket().written_text(), [ENVELOPE_OK, ENVELOPE_OK].concat());
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let socket = ScriptedSocket::default()
            .client(vec![
                Step::Send(b"GET / HTTP/1.1\r\n\r\n"),
                Step::Pause,
                Step::Pause,
                Step::Pause,
                Step::Pause,
            ])
            .client(vec![Step::Send(b"!on")]);
        let mut listener =
            RequestListener::new(socket, FramingPolicy::DelimiterDrain).max_idle_polls(3);

        for _ in 0..3 {
            assert_eq!(
                listener.poll_for_client(LinkState::Connected).await,
                Ok(ListenerPoll::Receiving)
            );
        }
        assert_eq!(
            listener.poll_for_client(LinkState::Connected).await,
            Ok(ListenerPoll::TimedOut)
        );
        assert_eq!(listener.socket().written_text(), ENVELOPE_OK);
        assert_eq!(listener.socket().closed, 1);
        assert!(!listener.is_reading());

        // The next client is served.
        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!on");
    }

    #[tokio::test]
    async fn test_silent_client_after_delimiter_delivers_command() {
        let socket = ScriptedSocket::default().client(vec![
            Step::Send(b"POST / HTTP/1.1\r\n\r\n!on"),
            Step::Pause,
            Step::Pause,
            Step::Pause,
        ]);
        let mut listener =
            RequestListener::new(socket, FramingPolicy::LineTerminated).max_idle_polls(2);

        for _ in 0..2 {
            assert_eq!(
                listener.poll_for_client(LinkState::Connected).await,
                Ok(ListenerPoll::Receiving)
            );
        }

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!on");
    }

    #[tokio::test]
    async fn test_command_is_stable_until_next_session() {
        let socket = ScriptedSocket::default()
            .client(vec![Step::Send(b"!on\n")])
            .client(vec![Step::Send(b"!o"), Step::Pause, Step::Send(b"ff\n")]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated);

        let _ = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(listener.command(), "!on");
        assert_eq!(listener.command(), "!on");

        assert_eq!(
            listener.poll_for_client(LinkState::Connected).await,
            Ok(ListenerPoll::Receiving)
        );
        assert_eq!(listener.command(), "");

        let _ = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(listener.command(), "!off");
    }

    #[tokio::test]
    async fn test_offline_listener_does_not_accept() {
        let socket = ScriptedSocket::default().client(vec![Step::Send(b"!on\n")]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated);

        assert_eq!(
            listener.poll_for_client(LinkState::Disconnected).await,
            Ok(ListenerPoll::NoClient)
        );
        assert_eq!(listener.socket().closed, 0);
    }

    #[tokio::test]
    async fn test_authorized_request() {
        let socket = ScriptedSocket::default()
            .client(vec![Step::Send(b"POST / HTTP/1.1\r\n\r\nWHALE!turn_on\n")]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated)
            .auth_gate(AuthGate::default());

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!turn_on");

        listener.respond("LAMP ON").await.unwrap();
        assert!(listener.socket().written_text().ends_with("\r\n\r\nLAMP ON\r\n"));
    }

    #[tokio::test]
    async fn test_rejected_requests() {
        let socket = ScriptedSocket::default()
            .client(vec![Step::Send(b"POST / HTTP/1.1\r\n\r\nORCA!turn_on\n")])
            .client(vec![Step::Send(b"GET / HTTP/1.1\r\n\r\nWHALE!turn_on\n")]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated)
            .auth_gate(AuthGate::default());

        let ListenerPoll::Rejected(result) = listener.poll_for_client(LinkState::Connected).await.unwrap()
        else {
            panic!("Expected a rejection");
        };
        assert_eq!(result.status, 403);
        assert_eq!(listener.command(), "");
        assert!(!listener.awaits_response());

        let ListenerPoll::Rejected(result) = listener.poll_for_client(LinkState::Connected).await.unwrap()
        else {
            panic!("Expected a rejection");
        };
        assert_eq!(result.status, 405);

        let written = listener.socket().written_text();
        assert!(written.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(written.contains("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert_eq!(listener.socket().closed, 2);
    }

    #[tokio::test]
    async fn test_padded_secret_is_rejected() {
        let socket = ScriptedSocket::default()
            .client(vec![Step::Send(b"POST / HTTP/1.1\r\n\r\n  WHALE \t!turn_on\n")])
            .client(vec![Step::Send(b"POST / HTTP/1.1\r\n\r\nWHALE\r\n!turn_on\n")]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated)
            .auth_gate(AuthGate::default());

        let ListenerPoll::Rejected(result) = listener.poll_for_client(LinkState::Connected).await.unwrap()
        else {
            panic!("Expected a rejection");
        };
        assert_eq!(result.status, 403);

        // A single line ending before the delimiter is not part of the secret.
        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!turn_on");
    }

    #[tokio::test]
    async fn test_long_secrets_must_match_exactly() {
        let secret = "A".repeat(64);
        let mut body = b"POST / HTTP/1.1\r\n\r\n".to_vec();
        body.extend_from_slice(secret.as_bytes());
        body.extend_from_slice(b"GARBAGE!turn_on\n");

        let socket = ScriptedSocket::default().client(vec![Step::Send(leak(body))]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated)
            .auth_gate(AuthGate::new(&secret));

        let ListenerPoll::Rejected(result) = listener.poll_for_client(LinkState::Connected).await.unwrap()
        else {
            panic!("Expected a rejection");
        };
        assert_eq!(result.status, 403);

        let secret = "B".repeat(65);
        let mut body = b"POST / HTTP/1.1\r\n\r\n".to_vec();
        body.extend_from_slice(secret.as_bytes());
        body.extend_from_slice(b"!turn_on\n");

        let socket = ScriptedSocket::default().client(vec![Step::Send(leak(body))]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated)
            .auth_gate(AuthGate::new(&secret));

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();
        assert_eq!(command(poll), "!turn_on");
    }

    #[tokio::test]
    async fn test_custom_delimiter() {
        let socket = ScriptedSocket::default()
            .client(vec![Step::Send(b"POST / HTTP/1.1\r\n\r\nWHALE#on!now\n")]);
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated)
            .delimiter(b'#')
            .auth_gate(AuthGate::default());

        let poll = listener.poll_for_client(LinkState::Connected).await.unwrap();

        assert_eq!(command(poll), "#on!now");
    }

    #[tokio::test]
    async fn test_write_failure_tears_down_session() {
        let mut socket = ScriptedSocket::default().client(vec![Step::Send(b"!on\n")]);
        socket.fail_writes = true;
        let mut listener = RequestListener::new(socket, FramingPolicy::LineTerminated);

        let _ = listener.poll_for_client(LinkState::Connected).await.unwrap();

        assert!(matches!(listener.respond("ON").await, Err(Error::Io(_))));
        assert!(!listener.awaits_response());
        assert_eq!(listener.socket().closed, 1);
    }
}
