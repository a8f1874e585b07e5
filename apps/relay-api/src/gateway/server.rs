//! WebSocket upgrade handler and per-connection event loop.

use std::fmt::Debug;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::AppState;

use super::error::GatewayError;
use super::events::InboundEvent;
use super::registry::{CloseSignal, ConnectionId, Frame};
use super::session::{ConnectionSession, Flow};

const CLOSE_NORMAL: u16 = 1000;

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(state.config.outbound_buffer);

    let mut session = ConnectionSession::new(
        out_tx,
        state.identities.clone(),
        state.registry.clone(),
        state.router.clone(),
    );
    let conn_id = session.conn_id().clone();
    tracing::debug!(%conn_id, "chat connection opened");

    let writer = tokio::spawn(write_loop(
        conn_id.clone(),
        ws_tx,
        out_rx,
        session.close_signal(),
    ));

    if let Err(err) = read_loop(&mut session, ws_rx).await {
        match &err {
            GatewayError::AuthFailure(_) => tracing::debug!(%conn_id, %err, "chat session rejected"),
            _ => tracing::info!(%conn_id, %err, "chat session ended"),
        }
    }

    session.close();
    drop(session);
    let _ = writer.await;

    tracing::debug!(%conn_id, "chat connection finished");
}

/// Read frames until the session stops, the peer leaves, or a read fails.
async fn read_loop(
    session: &mut ConnectionSession,
    mut ws_rx: SplitStream<WebSocket>,
) -> Result<(), GatewayError> {
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(?e, conn_id = %session.conn_id(), "ws read error");
                return Ok(());
            }
        };

        let event = match msg {
            Message::Text(text) => InboundEvent::parse(text.as_str().as_bytes()),
            Message::Binary(bytes) => InboundEvent::parse(&bytes),
            Message::Close(_) => return Ok(()),
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let event = event.map_err(|e| {
            session.close();
            GatewayError::ProtocolViolation(format!("malformed frame: {e}"))
        })?;

        if session.handle(event).await? == Flow::Stop {
            return Ok(());
        }
    }
    Ok(())
}

/// Sole writer for one socket: drains the outbound queue in order.
///
/// Stops as soon as the close signal fires, whatever the queue holds. Frames
/// accepted before the close are flushed, then a close frame is sent.
async fn write_loop<S>(
    conn_id: ConnectionId,
    mut ws_tx: S,
    mut out_rx: mpsc::Receiver<Frame>,
    signal: Arc<CloseSignal>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Debug,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = signal.closed() => break,
            frame = out_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(e) = ws_tx.send(Message::Text(frame.to_string().into())).await {
            tracing::debug!(?e, %conn_id, "ws write error");
            return;
        }
    }

    // Nothing is accepted once the signal has fired, so this ends.
    while let Ok(frame) = out_rx.try_recv() {
        if let Err(e) = ws_tx.send(Message::Text(frame.to_string().into())).await {
            tracing::debug!(?e, %conn_id, "ws write error");
            return;
        }
    }

    if let Err(e) = send_close(&mut ws_tx, CLOSE_NORMAL, "").await {
        tracing::debug!(?e, %conn_id, "ws close error");
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close<S>(ws_tx: &mut S, code: u16, reason: &str) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    type Written = Arc<Mutex<Vec<Message>>>;

    fn recording_sink(written: Written) -> impl Sink<Message, Error = Infallible> + Unpin {
        Box::pin(futures_util::sink::unfold(written, |log, msg: Message| async move {
            log.lock().push(msg);
            Ok::<_, Infallible>(log)
        }))
    }

    fn texts(written: &Written) -> Vec<String> {
        written
            .lock()
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(t.as_str().to_string()),
                _ => None,
            })
            .collect()
    }

    fn ends_with_close(written: &Written) -> bool {
        matches!(written.lock().last(), Some(Message::Close(_)))
    }

    #[tokio::test]
    async fn writer_stops_on_close_even_when_queue_is_full() {
        let (tx, rx) = mpsc::channel(2);
        let signal = Arc::new(CloseSignal::new());
        signal.try_send(&tx, Frame::from("a")).unwrap();
        signal.try_send(&tx, Frame::from("b")).unwrap();
        signal.close();

        let written = Written::default();
        let sink = recording_sink(written.clone());
        // `tx` stays alive: the writer must stop on the signal alone.
        tokio::time::timeout(
            Duration::from_secs(1),
            write_loop(ConnectionId::generate(), sink, rx, signal.clone()),
        )
        .await
        .expect("writer should finish after close");

        assert_eq!(texts(&written), vec!["a", "b"]);
        assert!(ends_with_close(&written));
        assert!(signal.try_send(&tx, Frame::from("late")).is_err());
    }

    #[tokio::test]
    async fn writer_forwards_frames_until_closed() {
        let (tx, rx) = mpsc::channel(4);
        let signal = Arc::new(CloseSignal::new());
        let written = Written::default();
        let writer = tokio::spawn(write_loop(
            ConnectionId::generate(),
            recording_sink(written.clone()),
            rx,
            signal.clone(),
        ));

        signal.try_send(&tx, Frame::from("one")).unwrap();
        for _ in 0..100 {
            if !texts(&written).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        signal.close();
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer should finish after close")
            .unwrap();

        assert_eq!(texts(&written), vec!["one"]);
        assert!(ends_with_close(&written));
    }

    #[tokio::test]
    async fn writer_finishes_when_queue_is_dropped() {
        let (tx, rx) = mpsc::channel::<Frame>(4);
        let written = Written::default();
        drop(tx);

        tokio::time::timeout(
            Duration::from_secs(1),
            write_loop(
                ConnectionId::generate(),
                recording_sink(written.clone()),
                rx,
                Arc::new(CloseSignal::new()),
            ),
        )
        .await
        .expect("writer should finish");
        assert!(ends_with_close(&written));
    }
}
