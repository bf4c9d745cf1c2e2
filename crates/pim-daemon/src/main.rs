//! Process wiring for the PIM broker (§1 "process launch and shutdown
//! supervision" is explicitly out of scope for the core; this binary is
//! the thin glue the core needs to actually run): reads configuration,
//! builds the shared [`ServerContext`], hydrates the collection-tree cache
//! and statistics cache on start (§4.2 Hydration, §4.10 Maintenance),
//! spawns the notification manager's coalescing loop (§4.5 "≈ 50 ms"), and
//! accepts TCP connections, each becoming one [`Session`] (§5 "each client
//! session runs in its own thread" — here, its own task).
//!
//! Frames on the wire are as `pim_protocol` defines them; this binary adds
//! one thing the protocol crate deliberately leaves out, a transport-level
//! `u32` length prefix per frame, so a stream socket knows where one frame
//! ends and the next begins without peeking into the payload encoding.

use std::sync::Arc;
use std::time::Duration;

use pim_protocol::{Command, Decoder, FrameHeader, Response};
use pim_server::cache::CollectionTreeCache;
use pim_server::notify::NotificationManager;
use pim_server::store::MemoryStore;
use pim_server::{SearchTaskRegistry, ServerConfig, ServerContext, Session, StatsCache};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:24247";
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match ServerConfig::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "falling back to default server config");
            ServerConfig::default()
        }
    };

    let ctx = build_context(&config).await?;

    let manager = ctx.manager.clone();
    let coalesce_interval = Duration::from_millis(config.notification_coalesce_interval_ms);
    tokio::spawn(async move {
        manager.run_coalescing_loop(coalesce_interval).await;
    });

    let bind_addr = std::env::var("PIM_BROKER_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "pim-broker listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, ctx).await {
                warn!(%peer, error = %err, "session connection ended with an error");
            }
        });
    }
}

/// Builds the shared server context and performs the one-time startup
/// work the core's caches need before any session can be served: collection
/// tree hydration (§4.2) and statistics prefetch (§4.10).
async fn build_context(config: &ServerConfig) -> Result<Arc<ServerContext>, Box<dyn std::error::Error>> {
    let store: Arc<dyn pim_server::Store> = Arc::new(MemoryStore::new());
    let cache = Arc::new(CollectionTreeCache::new());
    cache.hydrate(store.as_ref()).await?;

    let stats = Arc::new(StatsCache::new());
    let all_collections: Vec<_> = store.collections_ordered_by_id().await?.into_iter().map(|c| c.id).collect();
    stats.prefetch(&all_collections, store.as_ref()).await?;

    let manager = Arc::new(NotificationManager::new(config.dispatch_workers));

    Ok(Arc::new(ServerContext {
        store,
        cache,
        stats,
        manager,
        search_tasks: Arc::new(SearchTaskRegistry::new()),
    }))
}

/// Drives one TCP connection end to end: a reader half decodes command
/// frames and feeds them to a single [`Session`]; a writer half serializes
/// both command responses and this session's own asynchronously-arriving
/// notifications (§4.5, via the subscriber transport it hands out on
/// `CreateSubscription`) onto the same socket.
#[instrument(skip(socket, ctx))]
async fn handle_connection(socket: TcpStream, ctx: Arc<ServerContext>) -> Result<(), Box<dyn std::error::Error>> {
    socket.set_nodelay(true).ok();
    let (mut read_half, write_half) = socket.into_split();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_task = tokio::spawn(write_frames(write_half, outbound_rx));

    let mut session = Session::new(ctx);
    let mut notification_rx = session.take_notification_rx().expect("fresh session always has a receiver");
    let notify_tx = outbound_tx.clone();
    let notify_task = tokio::spawn(async move {
        while let Some(notification) = notification_rx.recv().await {
            let mut enc = pim_protocol::Encoder::new();
            let mut kind_enc = pim_protocol::Encoder::new();
            pim_protocol::write_entity_kind(&mut kind_enc, notification.kind());
            let kind = pim_protocol::CommandKind::from_u8(kind_enc.into_bytes()[0]);
            FrameHeader::notification(kind).encode(&mut enc);
            pim_protocol::encode_notification(&mut enc, &notification);
            if notify_tx.send(enc.into_bytes()).is_err() {
                break;
            }
        }
    });

    let hello = Response::Hello { server_version: 3 };
    let mut hello_enc = pim_protocol::Encoder::new();
    FrameHeader::response(pim_protocol::NO_TAG, pim_protocol::CommandKind::Hello).encode(&mut hello_enc);
    hello.encode(&mut hello_enc);
    outbound_tx.send(hello_enc.into_bytes()).ok();

    let result = read_commands(&mut read_half, &mut session, &outbound_tx).await;

    drop(outbound_tx);
    notify_task.abort();
    let _ = writer_task.await;
    result
}

async fn read_commands(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    session: &mut Session,
    outbound_tx: &mpsc::UnboundedSender<Vec<u8>>,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let frame = match read_one_frame(read_half).await? {
            Some(frame) => frame,
            None => return Ok(()),
        };

        let mut dec = Decoder::new(&frame);
        let header = FrameHeader::decode(&mut dec)?;
        let command = Command::decode(header.kind, &mut dec).unwrap_or(Command::Invalid);

        let responses = session.dispatch(command).await;
        for response in responses {
            let mut enc = pim_protocol::Encoder::new();
            FrameHeader::response(header.tag, header.kind).encode(&mut enc);
            response.encode(&mut enc);
            if outbound_tx.send(enc.into_bytes()).is_err() {
                return Ok(());
            }
        }

        if matches!(session.state, pim_server::SessionState::LoggingOut) {
            return Ok(());
        }
    }
}

async fn read_one_frame(read_half: &mut tokio::net::tcp::OwnedReadHalf) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error>> {
    let mut len_buf = [0u8; 4];
    match read_half.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte transport limit").into());
    }
    let mut body = vec![0u8; len as usize];
    read_half.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn write_frames(mut write_half: tokio::net::tcp::OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        let len = (frame.len() as u32).to_le_bytes();
        if write_half.write_all(&len).await.is_err() {
            break;
        }
        if write_half.write_all(&frame).await.is_err() {
            break;
        }
    }
    let _ = write_half.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_context_against_an_empty_store_without_error() {
        let config = ServerConfig::default();
        let ctx = build_context(&config).await.unwrap();
        assert_eq!(ctx.manager.subscriber_count(), 0);
    }
}
