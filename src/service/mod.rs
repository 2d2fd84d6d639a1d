//! Command dispatch for the control protocol.
//!
//! This is the service layer that correlates the two core components:
//! peer commands must carry a bearer token minted by the token
//! authority, user and token commands need none. The components never
//! call each other.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::auth::TokenAuthority;
use crate::error::{AuthErrorKind, ProtocolErrorKind, VpnError, VpnResult};
use crate::protocol::{Request, Response};
use crate::vpn::PeerController;

/// Dispatches control requests onto the authority and the controller.
pub struct VpnService {
    authority: Arc<TokenAuthority>,
    controller: Arc<PeerController>,
}

impl VpnService {
    /// Create a new service over the given components.
    pub fn new(authority: Arc<TokenAuthority>, controller: Arc<PeerController>) -> Self {
        Self {
            authority,
            controller,
        }
    }

    /// Handle one request, producing a response.
    ///
    /// All failures are reported in-band; this never returns an error to
    /// the transport.
    pub fn handle(&self, request: &Request) -> Response {
        match self.dispatch(request) {
            Ok(data) => Response::success(data),
            Err(e) => {
                warn!(command = %request.command, error = %e, "Request failed");
                Response::failure(&e)
            }
        }
    }

    fn dispatch(&self, request: &Request) -> VpnResult<serde_json::Value> {
        match request.command.as_str() {
            "user.register" => self.user_register(request),
            "token.issue" => self.token_issue(request),
            "peer.add" => self.peer_add(request),
            "peer.remove" => self.peer_remove(request),
            "peer.list" => self.peer_list(request),
            "server.status" => self.server_status(),
            other => Err(VpnError::Protocol {
                kind: ProtocolErrorKind::UnknownCommand {
                    name: other.to_string(),
                },
            }),
        }
    }

    fn user_register(&self, request: &Request) -> VpnResult<serde_json::Value> {
        let public_key = str_param(request, "public_key")?;
        let email = request.params.get("email").and_then(|v| v.as_str());

        let user = self.authority.register_user(email, public_key)?;
        info!(user_id = %user.id, "Registered user");

        Ok(serde_json::to_value(user)?)
    }

    fn token_issue(&self, request: &Request) -> VpnResult<serde_json::Value> {
        let user_id = str_param(request, "user_id")?;

        // The subject is not checked against the directory; see the
        // token authority's contract.
        let token = self.authority.issue_token(user_id)?;

        Ok(json!({
            "token": token,
            "expires_in": self.authority.token_ttl().as_secs(),
        }))
    }

    fn peer_add(&self, request: &Request) -> VpnResult<serde_json::Value> {
        let subject = self.authenticate(request)?;
        let public_key = str_param(request, "public_key")?;

        let ip = self.controller.add_peer(public_key)?;
        info!(subject = %subject, ip = %ip, "Peer registered");

        Ok(json!({ "ip": ip.to_string() }))
    }

    fn peer_remove(&self, request: &Request) -> VpnResult<serde_json::Value> {
        let subject = self.authenticate(request)?;
        let public_key = str_param(request, "public_key")?;

        self.controller.remove_peer(public_key)?;
        info!(subject = %subject, "Peer deregistered");

        Ok(json!({}))
    }

    fn peer_list(&self, request: &Request) -> VpnResult<serde_json::Value> {
        self.authenticate(request)?;

        let peers: serde_json::Map<String, serde_json::Value> = self
            .controller
            .list_peers()
            .into_iter()
            .map(|(key, ip)| (key, json!(ip.to_string())))
            .collect();

        Ok(json!({ "peers": peers }))
    }

    fn server_status(&self) -> VpnResult<serde_json::Value> {
        Ok(json!({
            "state": "running",
            "peer_count": self.controller.peer_count(),
            "user_count": self.authority.user_count(),
        }))
    }

    /// Verify the request's bearer token, returning the subject ID.
    fn authenticate(&self, request: &Request) -> VpnResult<String> {
        let token = request.token.as_deref().ok_or(VpnError::Auth {
            kind: AuthErrorKind::InvalidCredentials,
        })?;

        self.authority.verify_token(token)
    }
}

fn str_param<'a>(request: &'a Request, name: &str) -> VpnResult<&'a str> {
    request
        .params
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| VpnError::Protocol {
            kind: ProtocolErrorKind::MissingParameter {
                param: name.to_string(),
            },
        })
}
