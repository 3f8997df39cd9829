//! Packet routing between atom ports.
//!
//! The router owns every port and connection of a pipeline. A connection joins one source port
//! to one sink port and buffers packets in a bounded queue. Emission is gated by credits held per
//! source port: a producer requests credits, routes at most that many packets, then acknowledges
//! exactly the granted amount before it may request again.

use std::collections::VecDeque;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{GraphError, GraphResult};
use crate::format::ValueFormat;
use crate::packet::Packet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Source,
    Sink,
}

impl Direction {
    fn short(self) -> &'static str {
        match self {
            Self::Source => "SRC",
            Self::Sink => "SNK",
        }
    }
}

/// Registered port. `index` is the router-wide id, `atom`/`port` locate it in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortHandle {
    pub index: usize,
    pub atom: usize,
    pub port: usize,
    pub direction: Direction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub usize);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Per-connection flow settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkPolicy {
    /// Credits the source port may hold per request cycle.
    pub credits: u32,
    /// Queue capacity in packets.
    pub queue: usize,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            credits: 1,
            queue: 2,
        }
    }
}

#[derive(Debug)]
struct Port {
    handle: PortHandle,
    format: ValueFormat,
    credits_available: u32,
    credits_requested: u64,
    credits_acked: u64,
    /// Grant awaiting acknowledgement, with the number of packets still routable under it.
    outstanding: Option<(u32, u32)>,
    outgoing: Vec<ConnId>,
    incoming: Vec<ConnId>,
}

#[derive(Debug)]
struct Connection {
    src: usize,
    dst: usize,
    policy: LinkPolicy,
    active: bool,
    queue: VecDeque<Packet>,
    routed: u64,
    dropped: u64,
}

impl Connection {
    fn room(&self) -> usize {
        self.policy.queue.saturating_sub(self.queue.len())
    }
}

#[derive(Debug, Default)]
pub struct PacketRouter {
    ports: Vec<Port>,
    connections: Vec<Connection>,
}

impl PacketRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_port(
        &mut self,
        atom: usize,
        direction: Direction,
        port: usize,
        format: ValueFormat,
    ) -> PortHandle {
        let handle = PortHandle {
            index: self.ports.len(),
            atom,
            port,
            direction,
        };
        self.ports.push(Port {
            handle,
            format,
            credits_available: 0,
            credits_requested: 0,
            credits_acked: 0,
            outstanding: None,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        });
        tracing::trace!(
            atom,
            port,
            dir = direction.short(),
            index = handle.index,
            "port registered"
        );
        handle
    }

    /// Look up a registered port by its pipeline coordinates.
    pub fn find_port(&self, atom: usize, direction: Direction, port: usize) -> Option<PortHandle> {
        self.ports
            .iter()
            .map(|p| p.handle)
            .find(|h| h.atom == atom && h.direction == direction && h.port == port)
    }

    pub fn set_port_format(&mut self, handle: PortHandle, format: ValueFormat) -> GraphResult<()> {
        self.port_mut(handle)?.format = format;
        Ok(())
    }

    pub fn connect(
        &mut self,
        src: PortHandle,
        dst: PortHandle,
        policy: LinkPolicy,
    ) -> GraphResult<ConnId> {
        self.validate(src, dst)?;
        if policy.queue == 0 {
            return Err(GraphError::validation("connection queue capacity must be positive"));
        }
        let id = ConnId(self.connections.len());
        self.connections.push(Connection {
            src: src.index,
            dst: dst.index,
            policy,
            active: true,
            queue: VecDeque::with_capacity(policy.queue.min(64)),
            routed: 0,
            dropped: 0,
        });
        let sp = &mut self.ports[src.index];
        sp.outgoing.push(id);
        sp.credits_available = sp.credits_available.max(policy.credits);
        self.ports[dst.index].incoming.push(id);
        tracing::debug!(src = src.index, dst = dst.index, conn = %id, "connected");
        Ok(id)
    }

    /// Deactivate a connection and drop anything still queued on it.
    pub fn disconnect(&mut self, id: ConnId) -> GraphResult<()> {
        let conn = self
            .connections
            .get_mut(id.0)
            .ok_or_else(|| GraphError::validation(format!("unknown {id}")))?;
        if !conn.active {
            tracing::warn!(conn = %id, "disconnect of an inactive connection");
            return Ok(());
        }
        conn.active = false;
        conn.dropped += conn.queue.len() as u64;
        conn.queue.clear();
        tracing::debug!(conn = %id, "disconnected");
        Ok(())
    }

    pub fn is_active(&self, id: ConnId) -> bool {
        self.connections.get(id.0).is_some_and(|c| c.active)
    }

    /// Active connections leaving a source port.
    pub fn outgoing(&self, handle: PortHandle) -> Vec<ConnId> {
        self.ports
            .get(handle.index)
            .map(|p| p.outgoing.iter().copied().filter(|c| self.is_active(*c)).collect())
            .unwrap_or_default()
    }

    /// Active connections entering a sink port.
    pub fn incoming(&self, handle: PortHandle) -> Vec<ConnId> {
        self.ports
            .get(handle.index)
            .map(|p| p.incoming.iter().copied().filter(|c| self.is_active(*c)).collect())
            .unwrap_or_default()
    }

    /// Ask for up to `n` credits on a source port.
    ///
    /// The grant is capped by the port's credit pool and by the free room of its most loaded
    /// active connection. A positive grant must be acknowledged with [`Self::ack_credits`] before
    /// the next request.
    pub fn request_credits(&mut self, handle: PortHandle, n: u32) -> GraphResult<u32> {
        let room = self
            .outgoing(handle)
            .iter()
            .map(|c| self.connections[c.0].room())
            .min()
            .unwrap_or(0);
        let port = self.port_mut(handle)?;
        if port.handle.direction != Direction::Source {
            return Err(GraphError::credit(format!(
                "port {} is a sink and holds no credits",
                handle.index
            )));
        }
        if let Some((granted, _)) = port.outstanding {
            return Err(GraphError::credit(format!(
                "port {} requested credits with {granted} still unacknowledged",
                handle.index
            )));
        }
        port.credits_requested += u64::from(n);
        let room = u32::try_from(room).unwrap_or(u32::MAX);
        let granted = n.min(port.credits_available).min(room);
        port.credits_available -= granted;
        if granted > 0 {
            port.outstanding = Some((granted, granted));
        }
        tracing::trace!(
            port = handle.index,
            requested = n,
            granted,
            available = port.credits_available,
            "credits requested"
        );
        Ok(granted)
    }

    /// Return a grant. `count` must equal the outstanding grant.
    pub fn ack_credits(&mut self, handle: PortHandle, count: u32) -> GraphResult<()> {
        let port = self.port_mut(handle)?;
        match port.outstanding {
            Some((granted, _)) if granted == count => {
                port.outstanding = None;
                port.credits_available += count;
                port.credits_acked += u64::from(count);
                tracing::trace!(port = handle.index, count, "credits acknowledged");
                Ok(())
            }
            Some((granted, _)) => Err(GraphError::credit(format!(
                "port {} acknowledged {count} credits, {granted} were granted",
                handle.index
            ))),
            None => Err(GraphError::credit(format!(
                "port {} acknowledged {count} credits without a grant",
                handle.index
            ))),
        }
    }

    pub fn available_credits(&self, handle: PortHandle) -> u32 {
        self.ports
            .get(handle.index)
            .map_or(0, |p| p.credits_available)
    }

    /// Whether a grant on `handle` awaits acknowledgement.
    pub fn has_outstanding(&self, handle: PortHandle) -> bool {
        self.ports
            .get(handle.index)
            .is_some_and(|p| p.outstanding.is_some())
    }

    /// Enqueue a packet on every active connection of a source port, consuming one credit.
    ///
    /// Returns the number of connections that received it.
    pub fn route(&mut self, handle: PortHandle, packet: Packet) -> GraphResult<usize> {
        let targets = self.outgoing(handle);
        let port = self.port_mut(handle)?;
        match &mut port.outstanding {
            Some((_, left)) if *left > 0 => *left -= 1,
            _ => {
                return Err(GraphError::credit(format!(
                    "port {} routed a packet without credit",
                    handle.index
                )));
            }
        }
        if targets.is_empty() {
            tracing::warn!(port = handle.index, "route on a port without active connections");
            return Ok(0);
        }
        let (last, rest) = targets.split_last().map_or((None, &[][..]), |(l, r)| (Some(*l), r));
        for id in rest {
            self.enqueue(*id, packet.clone());
        }
        if let Some(id) = last {
            self.enqueue(id, packet);
        }
        Ok(targets.len())
    }

    fn enqueue(&mut self, id: ConnId, packet: Packet) {
        let conn = &mut self.connections[id.0];
        if conn.queue.len() >= conn.policy.queue {
            conn.queue.pop_front();
            conn.dropped += 1;
            tracing::warn!(conn = %id, "queue full, oldest packet dropped");
        }
        conn.queue.push_back(packet);
        conn.routed += 1;
    }

    /// Take the oldest packet queued on a connection.
    pub fn pop(&mut self, id: ConnId) -> Option<Packet> {
        self.connections
            .get_mut(id.0)
            .filter(|c| c.active)
            .and_then(|c| c.queue.pop_front())
    }

    pub fn queued(&self, id: ConnId) -> usize {
        self.connections
            .get(id.0)
            .filter(|c| c.active)
            .map_or(0, |c| c.queue.len())
    }

    pub fn routed(&self, id: ConnId) -> u64 {
        self.connections.get(id.0).map_or(0, |c| c.routed)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Ports with their formats and credit state, then active connections.
    pub fn dump_topology(&self) -> String {
        let mut atoms: Vec<usize> = self.ports.iter().map(|p| p.handle.atom).collect();
        atoms.sort_unstable();
        atoms.dedup();
        let mut out = String::from("PacketRouter topology:\n");
        let _ = writeln!(out, "  atoms: {}", atoms.len());
        let _ = writeln!(out, "  ports: {}", self.ports.len());
        let _ = writeln!(out, "  connections: {}", self.connections.len());
        out.push_str("ports:\n");
        for (i, p) in self.ports.iter().enumerate() {
            let _ = writeln!(
                out,
                "  [{i}] {} atom={} port={} format={} credits={} out={} in={}",
                p.handle.direction.short(),
                p.handle.atom,
                p.handle.port,
                p.format,
                p.credits_available,
                p.outgoing.len(),
                p.incoming.len()
            );
        }
        out.push_str("connections:\n");
        for (i, c) in self.connections.iter().enumerate().filter(|(_, c)| c.active) {
            let _ = writeln!(out, "  [{i}] port {} -> port {} (routed {})", c.src, c.dst, c.routed);
        }
        out
    }

    /// Credit counters per port.
    pub fn dump_ports(&self) -> String {
        let mut out = String::from("PacketRouter ports:\n");
        for (i, p) in self.ports.iter().enumerate() {
            let outstanding = p.outstanding.map_or(0, |(g, _)| g);
            let _ = writeln!(
                out,
                "  port {i}: credits={} requested={} acked={} outstanding={outstanding}",
                p.credits_available, p.credits_requested, p.credits_acked
            );
        }
        out
    }

    /// Every connection, including inactive ones.
    pub fn dump_connections(&self) -> String {
        let mut out = String::from("PacketRouter connections:\n");
        for (i, c) in self.connections.iter().enumerate() {
            let _ = writeln!(
                out,
                "  [{i}] {} -> {} ({}, queued={}/{}, routed={}, dropped={})",
                c.src,
                c.dst,
                if c.active { "active" } else { "inactive" },
                c.queue.len(),
                c.policy.queue,
                c.routed,
                c.dropped
            );
        }
        out
    }

    fn port_mut(&mut self, handle: PortHandle) -> GraphResult<&mut Port> {
        self.ports
            .get_mut(handle.index)
            .filter(|p| p.handle == handle)
            .ok_or_else(|| GraphError::validation(format!("unknown port {}", handle.index)))
    }

    fn validate(&self, src: PortHandle, dst: PortHandle) -> GraphResult<()> {
        if src.direction != Direction::Source {
            return Err(GraphError::validation("connection source must be a source port"));
        }
        if dst.direction != Direction::Sink {
            return Err(GraphError::validation("connection destination must be a sink port"));
        }
        for h in [src, dst] {
            if self.ports.get(h.index).is_none_or(|p| p.handle != h) {
                return Err(GraphError::validation(format!(
                    "port {} is not registered",
                    h.index
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/router.rs"]
mod tests;
