use bevy::prelude::Resource;
use crossbeam_channel::{Receiver, Sender};
use notegraph_core::Command;

use crate::net::Incoming;

#[derive(Resource)]
pub struct NetRx(pub Receiver<Incoming>);

/// Outgoing command line channel into the socket thread.
#[derive(Resource, Clone)]
pub struct NetTx(pub Sender<String>);

impl NetTx {
    pub fn send(&self, cmd: &Command) {
        let _ = self.0.send(cmd.encode());
    }
}
