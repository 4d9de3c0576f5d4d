use alloc::borrow::Cow;
use alloc::string::String;

use embedded_io_async::Write;

use crate::auth::AuthResult;

/// Default response body.
pub const DEFAULT_RESPONSE: &str = "OK";

struct Headers {
    status: u16,
    message: &'static str,
}

impl Headers {
    const fn from_status(status: u16) -> Self {
        let message = match status {
            200 => "OK",
            400 => "Bad Request",
            403 => "Forbidden",
            405 => "Method Not Allowed",
            503 => "Service Unavailable",
            _ => "Error",
        };

        Self { status, message }
    }
}

/// A minimal plain-text response which closes the connection once sent.
///
/// ```text
/// HTTP/1.1 200 OK
/// Content-Type: text/plain
/// Connection: close
///
/// OK
/// ```
pub struct Response {
    headers: Headers,
    body: Cow<'static, str>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200, Cow::Borrowed(DEFAULT_RESPONSE))
    }
}

impl From<AuthResult> for Response {
    fn from(result: AuthResult) -> Self {
        Self::new(result.status, Cow::Owned(result.message))
    }
}

impl Response {
    /// Creates a `200 OK` [`Response`] with the given body.
    #[must_use]
    pub fn ok(body: &str) -> Self {
        Self::new(200, Cow::Owned(body.into()))
    }

    /// Returns the status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.headers.status
    }

    /// Renders the whole response as text.
    #[must_use]
    pub fn to_text(&self) -> String {
        alloc::format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{}\r\n",
            self.headers.status,
            self.headers.message,
            self.body
        )
    }

    /// Writes the response to a client.
    ///
    /// # Errors
    ///
    /// The client write errors.
    pub async fn write<W: Write>(&self, writer: &mut W) -> Result<(), W::Error> {
        writer.write_all(self.to_text().as_bytes()).await?;
        writer.flush().await
    }

    const fn new(status: u16, body: Cow<'static, str>) -> Self {
        Self {
            headers: Headers::from_status(status),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::string::String;

    use crate::auth::AuthResult;
    use crate::tests::ScriptedSocket;

    use super::Response;

    #[test]
    fn test_default_envelope() {
        assert_eq!(
            Response::default().to_text(),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nOK\r\n"
        );
    }

    #[test]
    fn test_rejection_envelope() {
        let response = Response::from(AuthResult {
            authorized: false,
            status: 405,
            message: String::from("WRONG METHOD"),
        });

        assert_eq!(response.status(), 405);
        assert!(response.to_text().starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(response.to_text().ends_with("\r\n\r\nWRONG METHOD\r\n"));
    }

    #[tokio::test]
    async fn test_write() {
        let mut socket = ScriptedSocket::default();

        Response::ok("LAMP ON").write(&mut socket).await.unwrap();

        assert!(socket.written_text().ends_with("\r\n\r\nLAMP ON\r\n"));
    }
}
