//! Server network layer: websocket accept loop and per-connection message handling

use crate::chat::process_chat;
use crate::error::Result;
use crate::game::World;
use crate::movement::apply_move;
use crate::regen::RegenScheduler;
use crate::session::{ConnectionHandle, Outbound};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Notice sent when a request could not be completed because persistence failed.
pub const SERVER_ERROR_NOTICE: &str = "Server error, please try again";

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Main server: owns the listener and hands each connection its own task
pub struct Server {
    listener: TcpListener,
    world: World,
}

impl Server {
    pub async fn bind(world: World) -> Result<Self> {
        world.config.validate()?;
        let listener = TcpListener::bind(&world.config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server { listener, world })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Accepts connections until the future is dropped.
    ///
    /// Regeneration runs for as long as this does; dropping the future stops it.
    pub async fn run(self) -> Result<()> {
        let _regen = RegenScheduler::spawn(self.world.clone())?;
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let world = self.world.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(world, stream, addr).await {
                            warn!("Connection from {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Runs one connection to completion
///
/// Inbound frames are handled one at a time, each awaited before the next is
/// read, so a connection's requests never overlap. Whatever ends the
/// connection, its session is released before returning.
async fn handle_connection(world: World, stream: TcpStream, addr: SocketAddr) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (sink, mut source) = ws_stream.split();
    let (handle, outbound) = ConnectionHandle::new(addr);
    info!("Connection {} accepted from {}", handle.id, addr);

    let mut writer = tokio::spawn(spawn_writer(sink, outbound));

    let result = loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_text(&world, &handle, &text).await,
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
            // The writer stops when the connection is closed from our side (displacement).
            _ = &mut writer => break Ok(()),
        }
    };

    world.disconnect(handle.id).await;
    writer.abort();
    info!("Connection {} from {} closed", handle.id, addr);
    result
}

async fn spawn_writer(mut sink: WsSink, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Message(message) => {
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

async fn handle_text(world: &World, handle: &ConnectionHandle, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Dropping malformed payload from {}: {}", handle.addr, e);
            return;
        }
    };

    let nack = match &message {
        ClientMessage::Login { .. } => ServerMessage::LoginError {
            message: SERVER_ERROR_NOTICE.to_string(),
        },
        ClientMessage::Signup { .. } => ServerMessage::SignupError {
            message: SERVER_ERROR_NOTICE.to_string(),
        },
        ClientMessage::Move { .. } | ClientMessage::Chat { .. } => {
            ServerMessage::chat(SERVER_ERROR_NOTICE)
        }
    };

    if let Err(e) = dispatch(world, handle, message).await {
        error!("Request from connection {} failed: {}", handle.id, e);
        world.bus.send(handle, nack);
    }
}

/// Routes one decoded message to the component that owns it.
pub async fn dispatch(world: &World, handle: &ConnectionHandle, message: ClientMessage) -> Result<()> {
    match message {
        ClientMessage::Login { username, password } => {
            world.login(handle, &username, &password).await?;
        }
        ClientMessage::Signup { username, password } => {
            world.signup(handle, &username, &password).await?;
        }
        ClientMessage::Move { dx, dy } => match world.registry.session(handle.id).await {
            Some(session) => {
                apply_move(world, session.player_id, dx, dy).await?;
            }
            None => debug!("Ignoring move from unauthenticated connection {}", handle.id),
        },
        ClientMessage::Chat { text } => match world.registry.session(handle.id).await {
            Some(session) => {
                process_chat(world, handle, session.player_id, &text).await?;
            }
            None => debug!("Ignoring chat from unauthenticated connection {}", handle.id),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::game::tests::{connect, drain, test_world};
    use crate::gateway::{GatewayResult, PlayerGateway, PlayerPatch};
    use async_trait::async_trait;
    use shared::{OnlinePlayer, Player, PlayerId};
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Gateway whose every call fails, as if the database were down.
    struct UnavailableGateway;

    #[async_trait]
    impl PlayerGateway for UnavailableGateway {
        async fn get_by_username(&self, _username: &str) -> GatewayResult<Option<Player>> {
            Err(GatewayError::Backend("connection refused".to_string()))
        }

        async fn get_by_id(&self, _id: PlayerId) -> GatewayResult<Option<Player>> {
            Err(GatewayError::Backend("connection refused".to_string()))
        }

        async fn create(&self, _username: &str, _password_hash: &str) -> GatewayResult<Player> {
            Err(GatewayError::Backend("connection refused".to_string()))
        }

        async fn update_position(&self, _: PlayerId, _: i32, _: i32, _: i32) -> GatewayResult<()> {
            Err(GatewayError::Backend("connection refused".to_string()))
        }

        async fn update_fields(&self, _id: PlayerId, _patch: &PlayerPatch) -> GatewayResult<()> {
            Err(GatewayError::Backend("connection refused".to_string()))
        }

        async fn list_online(&self, _ids: &HashSet<PlayerId>) -> GatewayResult<Vec<OnlinePlayer>> {
            Err(GatewayError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_dropped_silently() {
        let (world, _store) = test_world("malformed");
        let (conn, mut rx) = connect();

        handle_text(&world, &conn, "not json").await;
        handle_text(&world, &conn, r#"{"type":"move","dx":"up"}"#).await;
        handle_text(&world, &conn, r#"{"type":"fly"}"#).await;

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_actions_before_login_are_ignored() {
        let (world, _store) = test_world("unauth");
        let (watcher, mut watcher_rx) = connect();
        world.signup(&watcher, "watcher", "pw").await.unwrap();
        drain(&mut watcher_rx);

        let (conn, mut rx) = connect();
        dispatch(&world, &conn, ClientMessage::Move { dx: 1, dy: 0 })
            .await
            .unwrap();
        dispatch(
            &world,
            &conn,
            ClientMessage::Chat {
                text: "hello".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(drain(&mut rx).is_empty());
        assert!(drain(&mut watcher_rx).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_routes_login_move_and_chat() {
        let (world, store) = test_world("dispatch");
        let (conn, mut rx) = connect();

        dispatch(
            &world,
            &conn,
            ClientMessage::Signup {
                username: "alice".to_string(),
                password: "pw".to_string(),
            },
        )
        .await
        .unwrap();
        dispatch(&world, &conn, ClientMessage::Move { dx: 0, dy: 1 })
            .await
            .unwrap();
        dispatch(
            &world,
            &conn,
            ClientMessage::Chat {
                text: "hi".to_string(),
            },
        )
        .await
        .unwrap();

        let alice = store.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!((alice.pos_x, alice.pos_y), (5, 6));

        let messages = drain(&mut rx);
        assert!(matches!(messages[0], ServerMessage::SignupSuccess { .. }));
        assert!(messages.contains(&ServerMessage::PlayerMoved {
            id: alice.id,
            x: 5,
            y: 6
        }));
        assert_eq!(messages.last(), Some(&ServerMessage::chat("alice: hi")));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported_not_swallowed() {
        let (base, _store) = test_world("unavailable");
        let world = World::new((*base.config).clone(), Arc::new(UnavailableGateway));
        let (conn, mut rx) = connect();

        let result = dispatch(
            &world,
            &conn,
            ClientMessage::Login {
                username: "alice".to_string(),
                password: "pw".to_string(),
            },
        )
        .await;
        assert!(result.is_err());

        handle_text(&world, &conn, r#"{"type":"signup","username":"a","password":"b"}"#).await;
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::SignupError {
                message: SERVER_ERROR_NOTICE.to_string()
            }]
        );
    }
}
