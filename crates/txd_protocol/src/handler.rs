//! Server-side seam between the wire and the transaction manager.

use crate::error::ProtocolResult;
use crate::messages::{RemoteError, RemoteErrorKind, TxRequest, TxResponse};

/// Answers decoded requests.
///
/// Implemented by the service; the TCP server and in-process loopback
/// connections both drive it through [`handle_frame`](Self::handle_frame).
pub trait TxRequestHandler: Send + Sync {
    /// Handles one request.
    fn handle(&self, request: TxRequest) -> TxResponse;

    /// Handles one encoded request frame body and returns the encoded reply.
    ///
    /// A body that does not decode is answered with an `Internal` error.
    fn handle_frame(&self, body: &[u8]) -> ProtocolResult<Vec<u8>> {
        let response = match TxRequest::decode(body) {
            Ok(request) => self.handle(request),
            Err(e) => TxResponse::Error(RemoteError::new(
                RemoteErrorKind::Internal,
                format!("malformed request: {e}"),
            )),
        };
        response.encode()
    }
}
