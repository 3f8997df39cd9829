//! Pipeline assembly and the tick loop.
//!
//! A [`Pipeline`] owns the render context, the atoms, their links and the packet router. Atoms
//! are initialized in insertion order, links are negotiated in topological order of their
//! producers, and every tick runs the atoms in deterministic dependency order.

pub mod def;
pub mod scheduler;

use crate::atom::{
    Atom, AtomConfig, Environment, PacketIo, PostInit, SinkIo, TickConfig, create_atom,
};
use crate::context::RenderContext;
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::ValueFormat;
use crate::format::negotiate::negotiate;
use crate::gfx::Gfx;
use crate::router::{ConnId, Direction, LinkPolicy, PacketRouter, PortHandle};

pub use def::{AtomDef, LinkDef, PipelineDef};
pub use scheduler::DagScheduler;

/// One side of a link: atom index and port index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub atom: usize,
    pub port: usize,
}

impl Endpoint {
    pub const fn new(atom: usize, port: usize) -> Self {
        Self { atom, port }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Pending,
    Active,
    Failed(String),
}

/// Directed edge from a source port to a sink port.
#[derive(Clone, Debug)]
pub struct Link {
    pub from: Endpoint,
    pub to: Endpoint,
    pub policy: LinkPolicy,
    /// Negotiated format, `Null` until negotiation succeeds.
    pub format: ValueFormat,
    pub state: LinkState,
    conn: Option<ConnId>,
}

impl Link {
    pub fn is_active(&self) -> bool {
        self.state == LinkState::Active
    }

    pub fn connection(&self) -> Option<ConnId> {
        self.conn
    }
}

struct Node<G: Gfx> {
    id: String,
    atom: Box<dyn Atom<G>>,
    config: AtomConfig,
    sinks: Vec<PortHandle>,
    sources: Vec<PortHandle>,
    /// Set when `finalize` failed; the node is skipped for the rest of the run.
    disabled: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Assembling,
    Running,
    Stopped,
}

/// Counters for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub frame: u64,
    /// Atoms whose `is_ready` returned true.
    pub ran: usize,
    /// Atoms skipped as not ready.
    pub skipped: usize,
    /// Packets handed to the router.
    pub routed: usize,
}

pub struct Pipeline<G: Gfx> {
    ctx: RenderContext<G>,
    env: Environment,
    nodes: Vec<Node<G>>,
    links: Vec<Link>,
    router: PacketRouter,
    edges: Vec<(usize, usize)>,
    order: Vec<usize>,
    state: Lifecycle,
    frame: u64,
    interval: f64,
}

impl<G: Gfx> Pipeline<G> {
    pub fn new(gfx: G) -> Self {
        Self::with_environment(gfx, Environment::new())
    }

    pub fn with_environment(gfx: G, env: Environment) -> Self {
        Self {
            ctx: RenderContext::new(gfx),
            env,
            nodes: Vec::new(),
            links: Vec::new(),
            router: PacketRouter::new(),
            edges: Vec::new(),
            order: Vec::new(),
            state: Lifecycle::Assembling,
            frame: 0,
            interval: 1.0 / 60.0,
        }
    }

    /// Add a configured atom. Returns its index.
    pub fn add_atom(
        &mut self,
        id: &str,
        atom: Box<dyn Atom<G>>,
        config: AtomConfig,
    ) -> GraphResult<usize> {
        self.ensure_assembling("add_atom")?;
        if self.atom_index(id).is_some() {
            return Err(GraphError::validation(format!("duplicate atom id '{id}'")));
        }
        self.nodes.push(Node {
            id: id.to_string(),
            atom,
            config,
            sources: Vec::new(),
            sinks: Vec::new(),
            disabled: None,
        });
        Ok(self.nodes.len() - 1)
    }

    /// Declare a link. Port ranges are checked during [`Self::initialize`].
    pub fn connect(
        &mut self,
        from: Endpoint,
        to: Endpoint,
        policy: LinkPolicy,
    ) -> GraphResult<usize> {
        self.ensure_assembling("connect")?;
        for ep in [from, to] {
            if ep.atom >= self.nodes.len() {
                return Err(GraphError::validation(format!(
                    "link references unknown atom index {}",
                    ep.atom
                )));
            }
        }
        if from.atom == to.atom {
            return Err(GraphError::validation(format!(
                "atom '{}' cannot link to itself",
                self.nodes[from.atom].id
            )));
        }
        if self.links.iter().any(|l| l.to == to) {
            return Err(GraphError::validation(format!(
                "sink {}:{} already has an incoming link",
                self.nodes[to.atom].id, to.port
            )));
        }
        if policy.queue == 0 {
            return Err(GraphError::validation("link queue capacity must be positive"));
        }
        self.links.push(Link {
            from,
            to,
            policy,
            format: ValueFormat::Null,
            state: LinkState::Pending,
            conn: None,
        });
        Ok(self.links.len() - 1)
    }

    pub fn set_tick_rate(&mut self, hz: f64) -> GraphResult<()> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(GraphError::config(format!("tick rate must be positive, got {hz}")));
        }
        self.interval = 1.0 / hz;
        Ok(())
    }

    /// Initialize atoms, negotiate links and run post-initialization.
    #[tracing::instrument(skip_all)]
    pub fn initialize(&mut self) -> GraphResult<()> {
        self.ensure_assembling("initialize")?;

        for i in 0..self.nodes.len() {
            let node = &mut self.nodes[i];
            if let Err(err) = node.atom.initialize(&mut self.ctx, &node.config, &self.env) {
                tracing::error!(atom = %node.id, kind = node.atom.kind(), %err, "initialize failed");
                for done in self.nodes[..i].iter_mut().rev() {
                    done.atom.uninitialize(&mut self.ctx);
                }
                self.state = Lifecycle::Stopped;
                return Err(err);
            }
            tracing::debug!(atom = %node.id, kind = node.atom.kind(), "initialized");
        }

        if let Err(err) = self.validate_ports().and_then(|()| self.build_order()) {
            self.teardown();
            return Err(err);
        }
        self.register_ports();
        self.negotiate_links();
        if let Err(err) = self.post_initialize() {
            self.teardown();
            return Err(err);
        }

        self.state = Lifecycle::Running;
        let active = self.links.iter().filter(|l| l.is_active()).count();
        tracing::debug!(active, failed = self.links.len() - active, "pipeline ready");
        Ok(())
    }

    fn validate_ports(&self) -> GraphResult<()> {
        for link in &self.links {
            let src = &self.nodes[link.from.atom];
            let dst = &self.nodes[link.to.atom];
            if link.from.port >= src.atom.source_count() {
                return Err(GraphError::validation(format!(
                    "atom '{}' has no source port {}",
                    src.id, link.from.port
                )));
            }
            if link.to.port >= dst.atom.sink_count() {
                return Err(GraphError::validation(format!(
                    "atom '{}' has no sink port {}",
                    dst.id, link.to.port
                )));
            }
        }
        Ok(())
    }

    fn build_order(&mut self) -> GraphResult<()> {
        self.edges = self.links.iter().map(|l| (l.from.atom, l.to.atom)).collect();
        self.order = DagScheduler::new(self.nodes.len(), &self.edges).into_order()?;
        Ok(())
    }

    fn register_ports(&mut self) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.sinks = (0..node.atom.sink_count())
                .map(|p| self.router.register_port(i, Direction::Sink, p, ValueFormat::Null))
                .collect();
            node.sources = (0..node.atom.source_count())
                .map(|p| self.router.register_port(i, Direction::Source, p, ValueFormat::Null))
                .collect();
        }
    }

    fn negotiate_links(&mut self) {
        let mut pos = vec![0usize; self.nodes.len()];
        for (rank, &atom) in self.order.iter().enumerate() {
            pos[atom] = rank;
        }
        let mut pending: Vec<usize> = (0..self.links.len()).collect();
        pending.sort_by_key(|&li| (pos[self.links[li].from.atom], li));

        for li in pending {
            let Link { from, to, policy, .. } = self.links[li];
            let offers = self.nodes[from.atom].atom.source_formats(from.port);
            let accepts = self.nodes[to.atom].atom.sink_formats(to.port);
            let fmt = match negotiate(&accepts, &offers) {
                Ok(fmt) => fmt,
                Err(err) => {
                    self.fail_link(li, err.to_string());
                    continue;
                }
            };
            if !self.nodes[from.atom].atom.negotiate_source_format(from.port, &fmt) {
                self.fail_link(li, format!("source rejected {fmt}"));
                continue;
            }
            if !self.nodes[to.atom].atom.negotiate_sink_format(to.port, &fmt) {
                self.fail_link(li, format!("sink rejected {fmt}"));
                continue;
            }
            let src = self.nodes[from.atom].sources[from.port];
            let dst = self.nodes[to.atom].sinks[to.port];
            let conn = match self.router.connect(src, dst, policy) {
                Ok(conn) => conn,
                Err(err) => {
                    self.fail_link(li, err.to_string());
                    continue;
                }
            };
            let _ = self.router.set_port_format(src, fmt);
            let _ = self.router.set_port_format(dst, fmt);
            let link = &mut self.links[li];
            link.format = fmt;
            link.state = LinkState::Active;
            link.conn = Some(conn);
            tracing::debug!(
                from = %self.nodes[from.atom].id,
                to = %self.nodes[to.atom].id,
                format = %fmt,
                "link negotiated"
            );
        }
    }

    fn post_initialize(&mut self) -> GraphResult<()> {
        for oi in 0..self.order.len() {
            let i = self.order[oi];
            let formats = (0..self.nodes[i].atom.sink_count())
                .map(|ch| {
                    self.incoming_link(i, ch)
                        .map_or(ValueFormat::Null, |li| self.links[li].format)
                })
                .collect();
            let mut post = PostInit::new(formats);
            let node = &mut self.nodes[i];
            if let Err(err) = node.atom.post_initialize(&mut self.ctx, &mut post) {
                tracing::error!(atom = %node.id, %err, "post_initialize failed");
                return Err(err);
            }
            for (ch, fmt) in post.into_requests() {
                self.renegotiate(i, ch, fmt);
            }
        }
        Ok(())
    }

    /// Forward a sink renegotiation request to the producer upstream of `(atom, ch)`.
    ///
    /// The producer's port carries one format, so every active sibling link fed by the same
    /// port moves to `fmt` as well; a sibling consumer that rejects it loses its link.
    fn renegotiate(&mut self, atom: usize, ch: usize, fmt: ValueFormat) {
        let Some(li) = self.incoming_link(atom, ch) else {
            tracing::warn!(atom = %self.nodes[atom].id, ch, "renegotiation on an unlinked sink");
            return;
        };
        let Link { from, to, .. } = self.links[li];
        if !self.nodes[from.atom].atom.negotiate_source_format(from.port, &fmt) {
            self.fail_link(li, format!("producer rejected renegotiated {fmt}"));
            return;
        }
        if !self.nodes[to.atom].atom.negotiate_sink_format(to.port, &fmt) {
            self.fail_link(li, format!("consumer rejected renegotiated {fmt}"));
            return;
        }
        let _ = self
            .router
            .set_port_format(self.nodes[from.atom].sources[from.port], fmt);

        let links: Vec<usize> = self.outgoing_links(from.atom, from.port).collect();
        for sibling in links {
            let to = self.links[sibling].to;
            if sibling != li && !self.nodes[to.atom].atom.negotiate_sink_format(to.port, &fmt) {
                self.fail_link(
                    sibling,
                    format!("consumer rejected {fmt} requested by a sibling link"),
                );
                continue;
            }
            let _ = self
                .router
                .set_port_format(self.nodes[to.atom].sinks[to.port], fmt);
            tracing::debug!(
                from = %self.nodes[from.atom].id,
                to = %self.nodes[to.atom].id,
                old = %self.links[sibling].format,
                new = %fmt,
                "link renegotiated"
            );
            self.links[sibling].format = fmt;
        }
    }

    fn incoming_link(&self, atom: usize, ch: usize) -> Option<usize> {
        self.links
            .iter()
            .position(|l| l.is_active() && l.to == Endpoint::new(atom, ch))
    }

    fn outgoing_links(&self, atom: usize, ch: usize) -> impl Iterator<Item = usize> + '_ {
        self.links
            .iter()
            .enumerate()
            .filter(move |(_, l)| l.is_active() && l.from == Endpoint::new(atom, ch))
            .map(|(li, _)| li)
    }

    fn fail_link(&mut self, li: usize, reason: String) {
        let link = &mut self.links[li];
        tracing::warn!(
            from = %self.nodes[link.from.atom].id,
            from_port = link.from.port,
            to = %self.nodes[link.to.atom].id,
            to_port = link.to.port,
            %reason,
            "link failed"
        );
        if let Some(conn) = link.conn
            && let Err(err) = self.router.disconnect(conn)
        {
            tracing::warn!(%err, "router disconnect failed");
        }
        link.state = LinkState::Failed(reason);
    }

    /// Run one tick at the pipeline's fixed rate.
    pub fn tick(&mut self) -> GraphResult<TickStats> {
        let cfg = TickConfig {
            frame: self.frame,
            time: self.frame as f64 * self.interval,
            delta: if self.frame == 0 { 0.0 } else { self.interval },
        };
        self.tick_with(&cfg)
    }

    /// Run one tick with caller-supplied timing.
    pub fn tick_with(&mut self, cfg: &TickConfig) -> GraphResult<TickStats> {
        if self.state != Lifecycle::Running {
            return Err(GraphError::validation("tick on a pipeline that is not running"));
        }
        let mut stats = TickStats {
            frame: cfg.frame,
            ..TickStats::default()
        };
        let mut sched = DagScheduler::new(self.nodes.len(), &self.edges);
        while let Some(i) = sched.pop_ready() {
            if self.step(i, cfg, &mut stats)? {
                stats.ran += 1;
            } else {
                stats.skipped += 1;
            }
            sched.mark_done(i);
        }
        self.frame = cfg.frame + 1;
        tracing::trace!(
            frame = cfg.frame,
            ran = stats.ran,
            skipped = stats.skipped,
            routed = stats.routed,
            "tick"
        );
        Ok(stats)
    }

    /// Readiness, receives, sends and finalize for one atom.
    ///
    /// Errors raised by the atom are contained: a failed receive drops its incoming link, a
    /// failed send drops the port's outgoing links and a failed finalize disables the node. Only
    /// pipeline-fatal errors are returned.
    fn step(&mut self, i: usize, cfg: &TickConfig, stats: &mut TickStats) -> GraphResult<bool> {
        if self.nodes[i].disabled.is_some() {
            return Ok(false);
        }
        let io = PacketIo::new(
            self.nodes[i]
                .sinks
                .iter()
                .map(|h| {
                    let conns = self.router.incoming(*h);
                    SinkIo {
                        connected: !conns.is_empty(),
                        queued: conns.iter().map(|c| self.router.queued(*c)).sum(),
                    }
                })
                .collect(),
        );
        if !self.nodes[i].atom.is_ready(&self.ctx, &io) {
            tracing::trace!(atom = %self.nodes[i].id, "not ready");
            return Ok(false);
        }

        for ch in 0..self.nodes[i].sinks.len() {
            let Some(li) = self.incoming_link(i, ch) else {
                continue;
            };
            let Some(packet) = self.links[li].conn.and_then(|c| self.router.pop(c)) else {
                continue;
            };
            if let Err(err) = self.nodes[i].atom.recv(&mut self.ctx, ch, packet) {
                if err.is_pipeline_fatal() {
                    return Err(err);
                }
                if !err.is_edge_local() {
                    tracing::error!(atom = %self.nodes[i].id, ch, %err, "recv failed");
                }
                self.fail_link(li, err.to_string());
            }
        }

        for ch in 0..self.nodes[i].sources.len() {
            let targets: Vec<usize> = self.outgoing_links(i, ch).collect();
            let Some(&first) = targets.first() else {
                continue;
            };
            let handle = self.nodes[i].sources[ch];
            let fmt = self.links[first].format;
            let granted = self.router.request_credits(handle, 1)?;
            if granted == 0 {
                tracing::trace!(atom = %self.nodes[i].id, ch, "no credit");
                continue;
            }
            let sent = self.nodes[i].atom.send(&mut self.ctx, cfg, ch, &fmt);
            let routed = match sent {
                Ok(Some(packet)) => self.router.route(handle, packet),
                Ok(None) => Ok(0),
                Err(err) => Err(err),
            };
            self.router.ack_credits(handle, granted)?;
            match routed {
                Ok(n) => stats.routed += n,
                Err(err) if err.is_pipeline_fatal() => return Err(err),
                Err(err) => {
                    if !err.is_edge_local() {
                        tracing::error!(atom = %self.nodes[i].id, ch, %err, "send failed");
                    }
                    for li in targets {
                        self.fail_link(li, err.to_string());
                    }
                }
            }
        }

        if let Err(err) = self.nodes[i].atom.finalize(&mut self.ctx, cfg) {
            if err.is_pipeline_fatal() {
                return Err(err);
            }
            self.disable(i, err.to_string());
        }
        Ok(true)
    }

    /// Stop scheduling atom `i` and drop every link it feeds.
    fn disable(&mut self, i: usize, reason: String) {
        tracing::error!(atom = %self.nodes[i].id, %reason, "atom disabled");
        let outputs: Vec<usize> = self
            .links
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_active() && l.from.atom == i)
            .map(|(li, _)| li)
            .collect();
        for li in outputs {
            self.fail_link(li, format!("producer disabled: {reason}"));
        }
        self.nodes[i].disabled = Some(reason);
    }

    /// Why atom `i` was disabled, if it was.
    pub fn disabled_reason(&self, i: usize) -> Option<&str> {
        self.nodes.get(i).and_then(|n| n.disabled.as_deref())
    }

    /// Run `ticks` ticks, stopping at the first pipeline-fatal error.
    pub fn run(&mut self, ticks: u64) -> GraphResult<Vec<TickStats>> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    /// Release every atom's resources. Texture owners go before framebuffer owners.
    #[tracing::instrument(skip(self))]
    pub fn uninitialize(&mut self) {
        if self.state == Lifecycle::Stopped {
            return;
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        for late in [false, true] {
            for node in self.nodes.iter_mut().rev() {
                if node.atom.owns_render_targets() == late {
                    node.atom.uninitialize(&mut self.ctx);
                    tracing::debug!(atom = %node.id, "uninitialized");
                }
            }
        }
        let leaked = self.ctx.live_stages();
        if leaked > 0 {
            tracing::warn!(leaked, "stages still live after teardown");
        }
        self.state = Lifecycle::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.state == Lifecycle::Running
    }

    pub fn atom_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn atom_id(&self, index: usize) -> Option<&str> {
        self.nodes.get(index).map(|n| n.id.as_str())
    }

    pub fn atom_kind(&self, index: usize) -> Option<&'static str> {
        self.nodes.get(index).map(|n| n.atom.kind())
    }

    pub fn atom_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link_state(&self, index: usize) -> Option<&LinkState> {
        self.links.get(index).map(|l| &l.state)
    }

    /// Topological atom order fixed at initialization.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn context(&self) -> &RenderContext<G> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RenderContext<G> {
        &mut self.ctx
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn router(&self) -> &PacketRouter {
        &self.router
    }

    fn ensure_assembling(&self, op: &str) -> GraphResult<()> {
        if self.state != Lifecycle::Assembling {
            return Err(GraphError::validation(format!(
                "{op} is only allowed before initialize"
            )));
        }
        Ok(())
    }
}

impl<G: Gfx + 'static> Pipeline<G> {
    /// Build atoms and links from a JSON description. The result still needs
    /// [`Pipeline::initialize`].
    #[tracing::instrument(skip_all, fields(atoms = def.atoms.len(), links = def.links.len()))]
    pub fn from_def(gfx: G, env: Environment, def: &PipelineDef) -> GraphResult<Self> {
        def.validate()?;
        let mut pipeline = Self::with_environment(gfx, env);
        for atom in &def.atoms {
            let boxed = create_atom::<G>(&atom.kind)?;
            pipeline.add_atom(&atom.id, boxed, atom.config.clone())?;
        }
        for link in &def.links {
            let from = pipeline.endpoint(&link.from)?;
            let to = pipeline.endpoint(&link.to)?;
            pipeline.connect(from, to, link.policy())?;
        }
        Ok(pipeline)
    }

    /// Add an atom by kind name.
    pub fn add_kind(&mut self, id: &str, kind: &str, config: AtomConfig) -> GraphResult<usize> {
        let atom = create_atom::<G>(kind)?;
        self.add_atom(id, atom, config)
    }

    fn endpoint(&self, s: &str) -> GraphResult<Endpoint> {
        let (id, port) = def::parse_endpoint(s)?;
        let atom = self
            .atom_index(id)
            .ok_or_else(|| GraphError::validation(format!("unknown atom '{id}'")))?;
        Ok(Endpoint::new(atom, port))
    }
}

impl<G: Gfx> Drop for Pipeline<G> {
    fn drop(&mut self) {
        if self.state == Lifecycle::Running {
            self.teardown();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/mod.rs"]
mod tests;
