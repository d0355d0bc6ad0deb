//! Resolution Broker
//!
//! Correlates every inbound request with exactly one response. A request is
//! answered at once from its client's staged queue when possible; otherwise
//! it is parked as a pending request until an operator submits a response
//! or the deadline passes.
//!
//! Leaving `Pending` happens in one place, `transition`, under the in-flight
//! map's shard lock. Manual submission, timeout, caller disconnect and
//! shutdown all race through it and exactly one of them wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::broker::error::{BrokerError, BrokerResult};
use crate::broker::pending::{
    FinishedLog, PendingRequest, PendingState, RequestId, Resolution, ResolutionSource,
};
use crate::notifications::{ExpiryReason, HubEvent, Publisher};
use crate::queue::types::{validate_response_object, validate_status_code};
use crate::queue::{ClientKey, QueueStore};

/// Default time a request waits for an operator
pub const DEFAULT_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of settled request ids remembered for late submissions
pub const DEFAULT_FINISHED_HISTORY: usize = 1024;

/// Broker tuning
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub resolution_timeout: Duration,
    pub finished_history: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            resolution_timeout: DEFAULT_RESOLUTION_TIMEOUT,
            finished_history: DEFAULT_FINISHED_HISTORY,
        }
    }
}

struct InFlight {
    request: PendingRequest,
    completion: Option<oneshot::Sender<Resolution>>,
}

enum Transition {
    Won {
        request: PendingRequest,
        completion: Option<oneshot::Sender<Resolution>>,
    },
    Lost(PendingState),
    Unknown,
}

/// Owner of the in-flight request set
pub struct ResolutionBroker {
    store: Arc<QueueStore>,
    publisher: Arc<dyn Publisher<HubEvent>>,
    in_flight: DashMap<RequestId, InFlight>,
    finished: Mutex<FinishedLog>,
    timeout: Duration,
    shutting_down: AtomicBool,
}

/// Retires a waiter whose caller went away before it settled
struct WaiterGuard<'a> {
    broker: &'a ResolutionBroker,
    id: RequestId,
    armed: bool,
}

impl WaiterGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.broker.retire(self.id, PendingState::Abandoned);
        }
    }
}

impl ResolutionBroker {
    /// Create a new broker drawing staged responses from `store`
    pub fn new(
        store: Arc<QueueStore>,
        publisher: Arc<dyn Publisher<HubEvent>>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            in_flight: DashMap::new(),
            finished: Mutex::new(FinishedLog::new(config.finished_history)),
            timeout: config.resolution_timeout,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn resolution_timeout(&self) -> Duration {
        self.timeout
    }

    /// Answer a request with the configured deadline
    pub async fn resolve(&self, client_key: ClientKey, body: Value) -> BrokerResult<Resolution> {
        self.resolve_with_timeout(client_key, body, self.timeout).await
    }

    /// Answer a request, waiting at most `wait` for an operator
    pub async fn resolve_with_timeout(
        &self,
        client_key: ClientKey,
        body: Value,
        wait: Duration,
    ) -> BrokerResult<Resolution> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BrokerError::ShuttingDown);
        }

        let id = RequestId::new();

        if let Some(staged) = self.store.pop_front(&client_key).await? {
            debug!("Request {} for {} answered from queue", id, client_key);
            self.publisher.publish(HubEvent::CompletedRequest {
                id,
                client_key,
                body,
                response: staged.body.clone(),
                status_code: staged.status_code,
                source: ResolutionSource::Automatic,
            });
            return Ok(Resolution {
                id,
                body: staged.body,
                status_code: staged.status_code,
                source: ResolutionSource::Automatic,
            });
        }

        let (completion, mut receiver) = oneshot::channel();
        let request = PendingRequest {
            id,
            client_key: client_key.clone(),
            received_at: Utc::now(),
            body,
            state: PendingState::Pending,
        };
        self.in_flight.insert(
            id,
            InFlight {
                request: request.clone(),
                completion: Some(completion),
            },
        );
        let mut guard = WaiterGuard {
            broker: self,
            id,
            armed: true,
        };

        info!("Request {} for {} waiting for a manual response", id, client_key);
        self.publisher.publish(HubEvent::NewRequest {
            id,
            client_key: request.client_key,
            body: request.body,
            received_at: request.received_at,
        });

        match tokio::time::timeout(wait, &mut receiver).await {
            Ok(Ok(resolution)) => {
                guard.disarm();
                Ok(resolution)
            }
            Ok(Err(_)) => {
                // Sender dropped without a value: retired by shutdown
                guard.disarm();
                Err(BrokerError::Abandoned { id })
            }
            Err(_) => {
                guard.disarm();
                if self.retire(id, PendingState::TimedOut) {
                    Err(BrokerError::ResolutionTimeout { id, waited: wait })
                } else {
                    // A submission settled it first; its value is on the way
                    receiver.await.map_err(|_| BrokerError::Abandoned { id })
                }
            }
        }
    }

    /// Deliver an operator response to a pending request
    ///
    /// Returns the request as it was settled. Exactly one submission per id
    /// succeeds; later ones get `AlreadyResolved`.
    pub fn submit_manual(
        &self,
        id: RequestId,
        body: Value,
        status_code: u16,
    ) -> BrokerResult<PendingRequest> {
        validate_response_object(&body)?;
        validate_status_code(status_code)?;

        match self.transition(&id, PendingState::Resolved) {
            Transition::Won {
                request,
                completion,
            } => {
                let resolution = Resolution {
                    id,
                    body: body.clone(),
                    status_code,
                    source: ResolutionSource::Manual,
                };
                if let Some(completion) = completion {
                    if completion.send(resolution).is_err() {
                        warn!("Request {} resolved but its caller is gone", id);
                    }
                }

                info!("Request {} for {} resolved manually ({})", id, request.client_key, status_code);
                self.publisher.publish(HubEvent::CompletedRequest {
                    id,
                    client_key: request.client_key.clone(),
                    body: request.body.clone(),
                    response: body,
                    status_code,
                    source: ResolutionSource::Manual,
                });
                Ok(request)
            }
            Transition::Lost(state) => {
                debug!("Late submission for request {} ({})", id, state);
                Err(BrokerError::AlreadyResolved { id })
            }
            Transition::Unknown => Err(BrokerError::NotFound { id }),
        }
    }

    /// Snapshot of requests still waiting, oldest first
    pub fn list_pending(&self) -> Vec<PendingRequest> {
        let mut pending: Vec<PendingRequest> = self
            .in_flight
            .iter()
            .filter(|entry| entry.request.state == PendingState::Pending)
            .map(|entry| entry.request.clone())
            .collect();
        pending.sort_by_key(|request| request.received_at);
        pending
    }

    /// Copy of one waiting request
    pub fn get_pending(&self, id: &RequestId) -> Option<PendingRequest> {
        self.in_flight
            .get(id)
            .filter(|entry| entry.request.state == PendingState::Pending)
            .map(|entry| entry.request.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Current or final state of a request this broker has seen recently
    pub fn request_state(&self, id: &RequestId) -> Option<PendingState> {
        self.in_flight
            .get(id)
            .map(|entry| entry.request.state)
            .or_else(|| self.finished.lock().get(id))
    }

    /// Refuse new requests and abandon every waiting one
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let ids: Vec<RequestId> = self.in_flight.iter().map(|entry| *entry.key()).collect();
        let abandoned = ids
            .into_iter()
            .filter(|id| self.retire(*id, PendingState::Abandoned))
            .count();
        info!("Resolution broker shut down ({} pending requests abandoned)", abandoned);
    }

    /// Move a request out of `Pending` without a response
    ///
    /// Dropping the completion sender wakes any waiter with a closed channel.
    fn retire(&self, id: RequestId, state: PendingState) -> bool {
        match self.transition(&id, state) {
            Transition::Won { request, .. } => {
                let reason = match state {
                    PendingState::TimedOut => ExpiryReason::Timeout,
                    _ => ExpiryReason::Abandoned,
                };
                info!("Request {} for {} {}", id, request.client_key, state);
                self.publisher.publish(HubEvent::RequestExpired {
                    id,
                    client_key: request.client_key,
                    reason,
                });
                true
            }
            Transition::Lost(_) | Transition::Unknown => false,
        }
    }

    /// The single exit from `Pending`
    fn transition(&self, id: &RequestId, to: PendingState) -> Transition {
        let outcome = match self.in_flight.get_mut(id) {
            Some(mut entry) if entry.request.state == PendingState::Pending => {
                entry.request.state = to;
                // Record before removal so late callers never see a gap
                self.finished.lock().record(*id, to);
                Transition::Won {
                    request: entry.request.clone(),
                    completion: entry.completion.take(),
                }
            }
            Some(entry) => Transition::Lost(entry.request.state),
            None => match self.finished.lock().get(id) {
                Some(state) => Transition::Lost(state),
                None => Transition::Unknown,
            },
        };

        if matches!(outcome, Transition::Won { .. }) {
            self.in_flight.remove(id);
        }
        outcome
    }
}
