//! Background read loop.
//!
//! Owns the read half of the socket, decodes every frame and forwards the
//! resulting [`IBEvent`] over an unbounded channel. The loop ends with a
//! single `ConnectionClosed` when the socket closes or a frame cannot be read.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::decoder::decode_server_msg;
use crate::errors::IBApiError;
use crate::transport::TransportReader;
use crate::wrapper::IBEvent;

pub struct MessageReader {
    transport: TransportReader,
    server_version: i32,
}

impl MessageReader {
    pub fn new(transport: TransportReader, server_version: i32) -> Self {
        Self {
            transport,
            server_version,
        }
    }

    pub fn spawn(self) -> (mpsc::UnboundedReceiver<IBEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(tx));
        (rx, handle)
    }

    async fn run(mut self, tx: mpsc::UnboundedSender<IBEvent>) {
        loop {
            match self.transport.read_message().await {
                Ok(frame) => {
                    if tx.send(decode_server_msg(&frame, self.server_version)).is_err() {
                        tracing::debug!("event receiver dropped, reader exiting");
                        return;
                    }
                }
                Err(IBApiError::Disconnected(reason)) => {
                    tracing::info!(%reason, "gateway connection closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "read loop failed");
                    break;
                }
            }
        }
        let _ = tx.send(IBEvent::ConnectionClosed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn frame(fields: &[&str]) -> Vec<u8> {
        let mut body = Vec::new();
        for f in fields {
            body.extend_from_slice(f.as_bytes());
            body.push(0);
        }
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend(body);
        out
    }

    async fn gateway_sending(messages: Vec<Vec<u8>>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut hello = [0u8; 17];
            stream.read_exact(&mut hello).await.unwrap();
            stream.write_all(&frame(&["176", "t"])).await.unwrap();
            for m in messages {
                stream.write_all(&m).await.unwrap();
            }
        });
        port
    }

    async fn spawn_reader(port: u16) -> (mpsc::UnboundedReceiver<IBEvent>, JoinHandle<()>) {
        let transport = Transport::connect("127.0.0.1", port).await.unwrap();
        let sv = transport.server_version();
        let (read_half, _write_half) = transport.into_split();
        MessageReader::new(read_half, sv).spawn()
    }

    #[tokio::test]
    async fn events_arrive_in_order_then_closed() {
        let port = gateway_sending(vec![
            frame(&["9", "1", "100"]),
            frame(&["15", "1", "DU123,DU456"]),
        ])
        .await;
        let (mut rx, handle) = spawn_reader(port).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        handle.await.unwrap();

        assert_eq!(
            events,
            vec![
                IBEvent::NextValidId { order_id: 100 },
                IBEvent::ManagedAccounts {
                    accounts: "DU123,DU456".into()
                },
                IBEvent::ConnectionClosed,
            ]
        );
    }

    #[tokio::test]
    async fn bad_frame_length_closes_stream() {
        let port = gateway_sending(vec![vec![0, 0, 0, 0]]).await;
        let (mut rx, handle) = spawn_reader(port).await;
        assert_eq!(rx.recv().await, Some(IBEvent::ConnectionClosed));
        assert_eq!(rx.recv().await, None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_receiver_stops_loop() {
        let port = gateway_sending(vec![frame(&["9", "1", "1"]), frame(&["9", "1", "2"])]).await;
        let (rx, handle) = spawn_reader(port).await;
        drop(rx);
        handle.await.unwrap();
    }
}
