use std::sync::mpsc::{self, Sender};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;

use bus::{Bus, BusReader};
use tracing::info;

use crate::connection::Connection;

#[derive(Clone, Debug)]
pub enum LinkEvent {
    /// A line received from the device.
    Line(String),
    /// A failure worth showing to the user.
    Status(String),
    /// The session is over and the connection is gone.
    Closed,
}

/// Handle to the worker thread that owns the open connection. All blocking
/// reads and writes happen on the worker, never on the UI thread.
pub struct Link {
    port: String,
    cmd: Sender<String>,
    flag: Arc<AtomicBool>,
    rx: BusReader<LinkEvent>,
}

impl Link {
    pub fn start(mut conn: Connection) -> Link {
        let port = conn.port().to_string();
        let worker_port = port.clone();
        let flag = Arc::new(AtomicBool::new(false));
        let stop = flag.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel::<String>();

        let mut bus = Bus::new(256);
        let rx = bus.add_rx();

        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                while let Ok(line) = cmd_rx.try_recv() {
                    match conn.send(&line) {
                        Ok(Some(reply)) => bus.broadcast(LinkEvent::Line(reply)),
                        Ok(None) => {}
                        Err(e) => {
                            bus.broadcast(LinkEvent::Status(e.to_string()));
                            stop.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }

                if stop.load(Ordering::SeqCst) {
                    break;
                }

                match conn.listen() {
                    Ok(Some(line)) => bus.broadcast(LinkEvent::Line(line)),
                    Ok(None) => {}
                    Err(e) => {
                        bus.broadcast(LinkEvent::Status(e.to_string()));
                        break;
                    }
                }
            }

            if let Err(e) = conn.close() {
                bus.broadcast(LinkEvent::Status(e.to_string()));
            }
            bus.broadcast(LinkEvent::Closed);
            info!("link for {worker_port} shut down");
        });

        Link {
            port,
            cmd: cmd_tx,
            flag,
            rx,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Queues a line for the worker to write. Fire and forget: the reply,
    /// if any, comes back later as a `Line` event.
    pub fn send(&self, line: String) {
        let _ = self.cmd.send(line);
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn try_recv(&mut self) -> Option<LinkEvent> {
        if let Ok(event) = self.rx.try_recv() {
            return Some(event);
        }

        None
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.stop();
    }
}
