//! Routes decoded requests: registry mutations plus outbound deliveries.
//!
//! The dispatcher is the only component that touches the [`RoleRegistry`].

use std::sync::Arc;

use rolecall_core::envelope::{no_agent_found, TAB_ALREADY_ASSIGNED};
use rolecall_core::{
    ClientId, OutboundEnvelope, Payload, RegisterResult, Request, RoleRegistry, TabId,
    TemplateProvider,
};
use rolecall_telemetry::MetricsRecorder;

use crate::client::{ClientRegistry, SendOutcome};

/// One outbound envelope and the connection that carries it.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub to: ClientId,
    pub envelope: OutboundEnvelope,
}

/// Counts of what happened to a batch of deliveries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub queued: usize,
    pub dropped: usize,
}

pub struct Dispatcher {
    roles: RoleRegistry,
    clients: Arc<ClientRegistry>,
    templates: Arc<dyn TemplateProvider>,
    metrics: Arc<MetricsRecorder>,
}

impl Dispatcher {
    pub fn new(
        clients: Arc<ClientRegistry>,
        templates: Arc<dyn TemplateProvider>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            roles: RoleRegistry::new(),
            clients,
            templates,
            metrics,
        }
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn registration_count(&self) -> usize {
        self.roles.len()
    }

    /// Apply `request` to the registry and return what must be sent.
    pub fn route(&self, origin: &ClientId, request: Request) -> Vec<Delivery> {
        self.metrics
            .counter_inc("envelopes_received_total", &[("action", request.kind())], 1);

        match request {
            Request::Register { tab_id, role } => self.register(origin, tab_id, role),
            Request::Query {
                tab_id,
                role,
                payload,
            } => self.query(origin, tab_id, &role, &payload),
            Request::Reset => {
                self.roles.clear();
                self.metrics.counter_inc("resets_total", &[], 1);
                tracing::info!(client_id = %origin, "Registry reset");
                Vec::new()
            }
            Request::Heartbeat => {
                tracing::trace!(client_id = %origin, "heartbeat");
                Vec::new()
            }
            Request::Incomplete { action, missing } => {
                tracing::warn!(
                    client_id = %origin,
                    action = action.as_str(),
                    missing,
                    "Envelope missing required field, ignoring"
                );
                Vec::new()
            }
            Request::Ignored { action } => {
                tracing::debug!(client_id = %origin, action = ?action, "Ignoring envelope");
                Vec::new()
            }
        }
    }

    /// Route `request` and queue every resulting delivery.
    pub fn dispatch(&self, origin: &ClientId, request: Request) -> DeliveryReport {
        let deliveries = self.route(origin, request);
        self.deliver(deliveries)
    }

    /// Release everything a closed connection held.
    pub fn disconnect(&self, client_id: &ClientId) {
        let released = self.roles.remove_owner(client_id);
        self.clients.unregister(client_id);
        if !released.is_empty() {
            tracing::info!(
                client_id = %client_id,
                released = released.len(),
                "Released registrations of closed connection"
            );
        }
    }

    fn register(&self, origin: &ClientId, tab_id: TabId, role: String) -> Vec<Delivery> {
        match self.roles.register(tab_id.clone(), role.as_str(), origin.clone()) {
            RegisterResult::Accepted => {
                self.metrics
                    .counter_inc("registrations_total", &[("result", "accepted")], 1);
                tracing::info!(client_id = %origin, tab_id = %tab_id, role = %role, "Agent registered");
                let opening = self.templates.opening_message(&role);
                vec![Delivery {
                    to: origin.clone(),
                    envelope: OutboundEnvelope::to_tab(tab_id, opening),
                }]
            }
            RegisterResult::AlreadyRegistered => {
                self.metrics
                    .counter_inc("registrations_total", &[("result", "rejected")], 1);
                tracing::warn!(client_id = %origin, tab_id = %tab_id, role = %role, "Tab already assigned");
                vec![Delivery {
                    to: origin.clone(),
                    envelope: OutboundEnvelope::to_tab(tab_id, TAB_ALREADY_ASSIGNED),
                }]
            }
        }
    }

    fn query(
        &self,
        origin: &ClientId,
        from_tab: Option<TabId>,
        role: &str,
        payload: &Payload,
    ) -> Vec<Delivery> {
        let targets = self.roles.lookup_by_role(role);

        if targets.is_empty() {
            self.metrics
                .counter_inc("queries_total", &[("result", "no_match")], 1);
            tracing::info!(client_id = %origin, role, "No agent found for role");
            return vec![Delivery {
                to: origin.clone(),
                envelope: OutboundEnvelope::untagged(no_agent_found(role)),
            }];
        }

        self.metrics
            .counter_inc("queries_total", &[("result", "delivered")], 1);
        let message = payload.render();
        tracing::info!(
            client_id = %origin,
            from_tab = ?from_tab.as_ref().map(ToString::to_string),
            role,
            recipients = targets.len(),
            "Fanning out query"
        );

        targets
            .into_iter()
            .map(|target| Delivery {
                to: target.owner,
                envelope: OutboundEnvelope::to_tab(target.tab_id, message.clone()),
            })
            .collect()
    }

    fn deliver(&self, deliveries: Vec<Delivery>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        // Each send is independent; a failed one never stops the rest.
        for delivery in deliveries {
            let json = match delivery.envelope.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(client_id = %delivery.to, error = %e, "Failed to encode outbound envelope");
                    report.dropped += 1;
                    continue;
                }
            };
            match self.clients.send_to(&delivery.to, json) {
                SendOutcome::Queued => {
                    tracing::trace!(client_id = %delivery.to, "Queued outbound envelope");
                    report.queued += 1;
                }
                SendOutcome::Full | SendOutcome::Gone => report.dropped += 1,
            }
        }
        self.metrics
            .counter_inc("messages_sent_total", &[], report.queued as u64);
        if report.dropped > 0 {
            self.metrics
                .counter_inc("messages_dropped_total", &[], report.dropped as u64);
        }
        report
    }
}
