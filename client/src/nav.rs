//! Page routes and the navigator seam.
//!
//! Routing itself is owned by the embedding UI; the client only asks for
//! a route change, optionally carrying transient state that is never
//! persisted.

use std::sync::Arc;

use tokio::sync::mpsc;

use moodwalk_common::protocol::{AnalysisResult, Trail};

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Home,
    Login,
    /// Results page with the in-memory handoff of one analysis.
    Results(Arc<AnalysisResult>),
    /// Full list of the lower-ranked trails.
    Trails { trails: Vec<Trail>, emotions: Vec<String> },
    Community { trail: Trail, from_analysis: bool },
    Coupons,
    History,
    Profile,
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that forwards route changes over a channel to the UI loop.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<Route>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Route>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelNavigator { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, route: Route) {
        if self.tx.send(route).is_err() {
            tracing::debug!("Navigation dropped: router is gone");
        }
    }
}
