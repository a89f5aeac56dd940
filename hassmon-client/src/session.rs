//! One connection lifetime against the Home Assistant WebSocket API
//!
//! A `ConnectionSession` opens the transport, answers `auth_required`,
//! subscribes every configured entity once `auth_ok` arrives and then routes
//! `event` frames to the dispatcher until the transport closes or shutdown is
//! requested. Whatever the reason the session ends, the subscription table is
//! cleared and the state drops back to `Disconnected` before `run` returns.
//!
//! Subscription ids start at 1 for every session. The table entry for an id is
//! written before the request carrying it is sent.

use crate::config::Entities;
use crate::{ConnectionState, DispatchOutcome, Dispatcher, MonitorMetrics, SubscriptionTable};
use crate::connection_state::StateTracker;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use hassmon_core::codec::{self, EventBody, InboundFrame, OutboundFrame};
use hassmon_core::{Error, Result, SemanticType, StateChangeEvent, ValueConverter};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// State shared by every session of one monitor
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) url: String,
    pub(crate) token: String,
    pub(crate) entities: Entities,
    pub(crate) converter: ValueConverter,
    pub(crate) table: SubscriptionTable,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) state: StateTracker,
    pub(crate) metrics: Option<Arc<MonitorMetrics>>,
}

pub(crate) struct ConnectionSession<'a> {
    ctx: &'a SessionContext,
    shutdown: watch::Receiver<bool>,
    next_message_id: u64,
    reached_live: bool,
}

impl<'a> ConnectionSession<'a> {
    pub(crate) fn new(ctx: &'a SessionContext, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            ctx,
            shutdown,
            next_message_id: 1,
            reached_live: false,
        }
    }

    /// Whether this session got as far as sending all subscriptions
    pub(crate) fn reached_live(&self) -> bool {
        self.reached_live
    }

    /// Run until shutdown (`Ok`) or until the connection ends (`Err`)
    ///
    /// A server-side close is reported as `Error::ConnectionClosed`.
    #[tracing::instrument(name = "session", skip(self), fields(url = %self.ctx.url))]
    pub(crate) async fn run(&mut self) -> Result<()> {
        let outcome = self.drive().await;

        let dropped = self.ctx.table.clear().await;
        if dropped > 0 {
            tracing::debug!(dropped, "Cleared subscription table");
        }
        self.ctx.state.set(ConnectionState::Disconnected);

        outcome
    }

    async fn drive(&mut self) -> Result<()> {
        self.ctx.state.set(ConnectionState::Connecting);
        tracing::info!("Connecting to Home Assistant");

        let ws_stream = tokio::select! {
            _ = wait_for_shutdown(&mut self.shutdown) => return Ok(()),
            connected = connect_async(self.ctx.url.as_str()) => {
                let (ws_stream, _response) =
                    connected.map_err(|e| Error::WebSocket(e.to_string()))?;
                ws_stream
            }
        };
        tracing::debug!("Transport open, waiting for auth_required");

        let (mut sink, mut stream) = ws_stream.split();

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Failed to send close frame");
                    }
                    return Ok(());
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text, &mut sink).await?,
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(reason = ?frame, "Connection closed by server");
                        return Err(Error::ConnectionClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(Error::WebSocket(e.to_string())),
                    None => return Err(Error::ConnectionClosed),
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str, sink: &mut WsSink) -> Result<()> {
        let frame = match codec::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                if let Some(ref m) = self.ctx.metrics {
                    m.record_error("protocol");
                }
                return Ok(());
            }
        };

        if let Some(ref m) = self.ctx.metrics {
            m.record_frame(frame_kind(&frame));
        }

        match frame {
            InboundFrame::AuthRequired { ha_version } => {
                tracing::debug!(ha_version = ?ha_version, "Authentication required");
                send_frame(sink, &OutboundFrame::auth(self.ctx.token.as_str())).await?;
                self.ctx.state.set(ConnectionState::Authenticating);
            }
            InboundFrame::AuthOk { ha_version } => {
                if self.reached_live {
                    tracing::warn!("Ignoring repeated auth_ok");
                    return Ok(());
                }
                tracing::info!(ha_version = ?ha_version, "Authenticated");
                self.subscribe_all(sink).await?;
            }
            InboundFrame::AuthInvalid { message } => {
                let message = message.unwrap_or_else(|| "access token rejected".to_string());
                return Err(Error::AuthenticationFailed(message));
            }
            InboundFrame::Result { id, success, error } => {
                if success {
                    tracing::debug!(subscription_id = id, "Subscription acknowledged");
                } else {
                    let entity_id = self.ctx.table.resolve(id).await;
                    let error = error.map(|e| e.to_string()).unwrap_or_default();
                    tracing::error!(
                        subscription_id = id,
                        entity_id = ?entity_id,
                        error = %error,
                        "Subscription rejected"
                    );
                }
            }
            InboundFrame::Event { id, event } => self.route_event(id, event).await,
            InboundFrame::Unknown => {
                tracing::trace!("Ignoring frame of unknown type");
            }
        }

        Ok(())
    }

    async fn subscribe_all(&mut self, sink: &mut WsSink) -> Result<()> {
        self.ctx.state.set(ConnectionState::Subscribing);

        let ctx = self.ctx;
        for spec in ctx.entities.iter() {
            let id = self.next_message_id;
            self.next_message_id += 1;

            ctx.table.insert(id, spec.entity_id.as_str()).await;
            send_frame(sink, &OutboundFrame::subscribe_state(id, spec.entity_id.as_str())).await?;
            tracing::debug!(
                subscription_id = id,
                entity_id = %spec.entity_id,
                data_type = %spec.semantic_type,
                "Subscribed"
            );
        }

        self.reached_live = true;
        self.ctx.state.set(ConnectionState::Live);
        tracing::info!(entities = ctx.entities.len(), "Monitoring entities");
        Ok(())
    }

    async fn route_event(&self, id: u64, body: EventBody) {
        let resolved = match self.ctx.table.resolve(id).await {
            Some(entity_id) => self
                .ctx
                .entities
                .get(&entity_id)
                .map(|kind| (entity_id, kind)),
            None => None,
        };

        let Some((entity_id, kind)) = resolved else {
            tracing::debug!(subscription_id = id, "Dropping event for unknown subscription");
            if let Some(ref m) = self.ctx.metrics {
                m.record_dropped_event();
            }
            return;
        };

        let event = build_event(entity_id, id, kind, body, &self.ctx.converter);
        tracing::trace!(
            entity_id = %event.entity_id,
            subscription_id = id,
            new_state = ?event.new_state_raw,
            "State changed"
        );

        let entity_id = event.entity_id.clone();
        let outcome: DispatchOutcome = self.ctx.dispatcher.dispatch(event).await;
        if let Some(ref m) = self.ctx.metrics {
            m.record_dispatch(&entity_id, outcome.as_str());
        }
    }
}

/// Assemble the callback record for one trigger
///
/// `last_changed`, `last_updated` come from `to_state`; either state may be
/// missing when the entity appeared or was removed.
pub(crate) fn build_event(
    entity_id: String,
    subscription_id: u64,
    kind: SemanticType,
    body: EventBody,
    converter: &ValueConverter,
) -> StateChangeEvent {
    let trigger = body
        .variables
        .and_then(|variables| variables.trigger)
        .unwrap_or_default();
    let for_duration = trigger.for_duration_text();
    let to_state = trigger.to_state.unwrap_or_default();
    let from_state = trigger.from_state.unwrap_or_default();

    let new_state_raw = to_state.state_text();
    let old_state_raw = from_state.state_text();
    let timestamps = converter.timestamps();

    StateChangeEvent {
        entity_id,
        subscription_id,
        data_type: kind,
        new_state: converter.convert(new_state_raw.as_deref(), kind),
        old_state: converter.convert(old_state_raw.as_deref(), kind),
        new_state_raw,
        old_state_raw,
        new_attributes: to_state.attributes,
        old_attributes: from_state.attributes,
        last_changed: timestamps.parse(to_state.last_changed.as_deref()),
        last_updated: timestamps.parse(to_state.last_updated.as_deref()),
        for_duration,
    }
}

async fn send_frame(sink: &mut WsSink, frame: &OutboundFrame) -> Result<()> {
    let text = codec::encode(frame)?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))
}

/// Resolves once shutdown is requested or the monitor handle is gone
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn frame_kind(frame: &InboundFrame) -> &'static str {
    match frame {
        InboundFrame::AuthRequired { .. } => "auth_required",
        InboundFrame::AuthOk { .. } => "auth_ok",
        InboundFrame::AuthInvalid { .. } => "auth_invalid",
        InboundFrame::Result { .. } => "result",
        InboundFrame::Event { .. } => "event",
        InboundFrame::Unknown => "unknown",
    }
}
