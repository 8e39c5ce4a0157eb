//! Session worker thread.
//!
//! [`spawn_session`] moves a [`Session`] onto its own thread and drains one command
//! channel; client commands, decoder callbacks and focus changes all go through it.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use session_types::{Command, FocusState, PlaybackSnapshot, SessionEvent};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::events::{EventBus, ListenerId, SessionListener};
use crate::session::{Collaborators, Session, SessionMessage};

/// Handle for talking to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: Sender<SessionMessage>,
    bus: EventBus,
    snapshot: Arc<Mutex<PlaybackSnapshot>>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Spawn the session worker thread.
pub fn spawn_session(config: SessionConfig, collaborators: Collaborators) -> Result<SessionHandle> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let session = Session::new(config, collaborators, tx.clone());
    let bus = session.bus().clone();
    let snapshot = session.snapshot_cell();
    let join = std::thread::Builder::new()
        .name("playback-session".to_string())
        .spawn(move || session_thread_main(session, rx))
        .map_err(|err| {
            tracing::error!("failed to spawn session thread: {err}");
            SessionError::Closed
        })?;
    Ok(SessionHandle {
        tx,
        bus,
        snapshot,
        join: Arc::new(Mutex::new(Some(join))),
    })
}

/// Main loop for the session worker.
fn session_thread_main(mut session: Session, rx: Receiver<SessionMessage>) {
    tracing::info!("playback session started");
    while let Ok(msg) = rx.recv() {
        let shutdown = matches!(msg, SessionMessage::Shutdown);
        session.handle(msg);
        if shutdown {
            break;
        }
    }
    tracing::info!("playback session stopped");
}

impl SessionHandle {
    /// Queue a client command. Fails once the session has shut down.
    pub fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(SessionMessage::Command(cmd))
            .map_err(|_| SessionError::Closed)
    }

    /// Forward a platform focus change (for hosts that learn about focus out of band).
    pub fn notify_focus(&self, state: FocusState) -> Result<()> {
        self.tx
            .send(SessionMessage::Focus(state))
            .map_err(|_| SessionError::Closed)
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn add_listener(&self, listener: &Arc<dyn SessionListener>) -> ListenerId {
        self.bus.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.bus.remove_listener(id)
    }

    /// Last published playback snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        match self.snapshot.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stop playback, release every resource and wait for the worker to exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionMessage::Shutdown);
        let join = match self.join.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(join) = join {
            if join.join().is_err() {
                tracing::warn!("session thread panicked");
            }
        }
    }
}
