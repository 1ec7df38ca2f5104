//! Congestion Control Component
//!
//! Tracks destination links that signalled backpressure.

/// Congestion Control State
///
/// A node enters the list when a send to it reports congestion and leaves
/// it when the link sends a wakeup.
pub struct CongestionControlState {
    pub cong_links: Vec<u32>,   // Congested destination nodes
    pub cong_link_cnt: u32,     // Outstanding wakeups
}

impl CongestionControlState {
    pub fn new() -> Self {
        Self {
            cong_links: Vec::new(),
            cong_link_cnt: 0,
        }
    }

    #[inline]
    pub fn is_congested(&self) -> bool {
        self.cong_link_cnt != 0
    }

    pub fn is_link_congested(&self, dnode: u32) -> bool {
        self.cong_links.contains(&dnode)
    }

    // ------------------------------------------------------------------------
    // Backpressure
    // ------------------------------------------------------------------------

    /// Datagram send to `dnode` came back congested
    pub fn on_link_congested(&mut self, dnode: u32) {
        if !self.cong_links.contains(&dnode) {
            self.cong_links.push(dnode);
        }
        self.cong_link_cnt += 1;
    }

    /// Connection send came back congested
    pub fn on_conn_link_congested(&mut self) {
        self.cong_link_cnt = 1;
    }

    /// Multicast send reported `count` congested links
    pub fn on_mcast_congested(&mut self, count: u32) {
        self.cong_link_cnt += count;
    }

    // ------------------------------------------------------------------------
    // Relief
    // ------------------------------------------------------------------------

    /// Wakeup from the link to `node`
    pub fn on_wakeup(&mut self, node: u32) {
        self.cong_links.retain(|&n| n != node);
        self.cong_link_cnt = self.cong_link_cnt.saturating_sub(1);
    }

    pub fn purge(&mut self) {
        self.cong_links.clear();
        self.cong_link_cnt = 0;
    }
}
