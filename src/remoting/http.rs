use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::filter::ResponseFilter;
use super::protocol::{CommandRequest, ENDPOINT_COMMAND};
use super::response::{Response, ResponseMode};
use super::transport::{BoxFuture, Invocation, Transport};
use crate::error::{GridError, Result};
use crate::membership::service::MembershipService;
use crate::membership::types::Address;

/// Transport that delivers commands as JSON over HTTP, one request per target.
pub struct HttpTransport {
    membership: Arc<MembershipService>,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(membership: Arc<MembershipService>) -> Arc<Self> {
        Arc::new(Self {
            membership,
            http_client: reqwest::Client::new(),
        })
    }
}

async fn send_command(
    client: &reqwest::Client,
    url: &str,
    request: &CommandRequest,
    timeout: Duration,
) -> Response {
    let response = match client.post(url).json(request).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => return Response::Exception(GridError::Transport(e.to_string()).to_string()),
    };

    if !response.status().is_success() {
        let error = GridError::Transport(format!("HTTP {}", response.status()));
        return Response::Exception(error.to_string());
    }

    match response.json::<Response>().await {
        Ok(decoded) => decoded,
        Err(e) => Response::Exception(GridError::Serialization(e.to_string()).to_string()),
    }
}

async fn view_changed(view_rx: &mut Option<watch::Receiver<Vec<Address>>>) -> Option<Vec<Address>> {
    let rx = view_rx.as_mut()?;
    rx.changed().await.ok()?;
    Some(rx.borrow_and_update().clone())
}

/// Gathers replies from in-flight calls until `mode` and `filter` are satisfied.
///
/// Calls still running when this returns are detached; their replies are dropped.
pub async fn collect_responses(
    mut calls: JoinSet<(Address, Response)>,
    mode: ResponseMode,
    mut filter: Option<Box<dyn ResponseFilter>>,
    mut view_rx: Option<watch::Receiver<Vec<Address>>>,
    timeout: Duration,
) -> Result<HashMap<Address, Response>> {
    let mut responses = HashMap::new();

    if mode == ResponseMode::Asynchronous {
        calls.detach_all();
        return Ok(responses);
    }

    let filtered = mode == ResponseMode::WaitForValidResponse;
    if filtered && filter.as_ref().is_some_and(|f| !f.need_more_responses()) {
        calls.detach_all();
        return Ok(responses);
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut view_open = view_rx.is_some();

    loop {
        tokio::select! {
            joined = calls.join_next() => {
                let Some(joined) = joined else {
                    break;
                };
                let (sender, response) = match joined {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::error!("Remote call task failed: {}", e);
                        continue;
                    }
                };

                let accepted = match filter.as_mut() {
                    Some(f) => f.is_acceptable(&response, &sender),
                    None => true,
                };
                if accepted {
                    responses.insert(sender, response);
                }

                if filtered && filter.as_ref().is_some_and(|f| !f.need_more_responses()) {
                    break;
                }
            }
            view = view_changed(&mut view_rx), if view_open => {
                let Some(members) = view else {
                    view_open = false;
                    continue;
                };
                if let Some(f) = filter.as_mut() {
                    f.on_view_change(&members);
                    if filtered && !f.need_more_responses() {
                        break;
                    }
                }
            }
            _ = &mut deadline => {
                calls.detach_all();
                return Err(GridError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    calls.detach_all();
    Ok(responses)
}

impl Transport for HttpTransport {
    fn address(&self) -> Address {
        self.membership.local_address()
    }

    fn members(&self) -> Vec<Address> {
        self.membership.view()
    }

    fn invoke_remotely<'a>(
        &'a self,
        targets: Vec<Address>,
        invocation: Invocation,
        mode: ResponseMode,
        timeout: Duration,
        filter: Option<Box<dyn ResponseFilter>>,
    ) -> BoxFuture<'a, Result<HashMap<Address, Response>>> {
        Box::pin(async move {
            let local = self.address();
            let request = CommandRequest {
                op_id: invocation.op_id.clone(),
                origin: local.clone(),
                command_id: invocation.command.command_id(),
                parameters: invocation.command.parameters(),
            };

            let mut seen = HashSet::new();
            let mut calls = JoinSet::new();
            for target in targets {
                if target == local || !seen.insert(target.clone()) {
                    continue;
                }
                let Some(node) = self.membership.get_member(&target) else {
                    tracing::warn!("Skipping {}: not in the current view", target);
                    continue;
                };

                let client = self.http_client.clone();
                let url = format!("http://{}{}", node.http_addr, ENDPOINT_COMMAND);
                let request = request.clone();
                calls.spawn(async move {
                    let response = send_command(&client, &url, &request, timeout).await;
                    (target, response)
                });
            }

            tracing::debug!(
                "Invoking {} on {} member(s) ({:?})",
                invocation.command,
                calls.len(),
                mode
            );

            collect_responses(calls, mode, filter, Some(self.membership.subscribe()), timeout).await
        })
    }
}
