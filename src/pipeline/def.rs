//! JSON pipeline description.
//!
//! ```json
//! {
//!   "atoms": [
//!     {"id": "img", "kind": "image_source", "config": {"filepath": "in.png"}},
//!     {"id": "tex", "kind": "texture"}
//!   ],
//!   "links": [{"from": "img:0", "to": "tex:0", "queue": 2}]
//! }
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::atom::{ATOM_KINDS, AtomConfig};
use crate::foundation::error::{GraphError, GraphResult};
use crate::router::LinkPolicy;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDef {
    pub atoms: Vec<AtomDef>,
    #[serde(default)]
    pub links: Vec<LinkDef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtomDef {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub config: AtomConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDef {
    /// `"<atom id>:<source port>"`
    pub from: String,
    /// `"<atom id>:<sink port>"`
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<usize>,
}

impl LinkDef {
    pub fn policy(&self) -> LinkPolicy {
        let d = LinkPolicy::default();
        LinkPolicy {
            credits: self.credits.unwrap_or(d.credits),
            queue: self.queue.unwrap_or(d.queue),
        }
    }
}

/// Split `"id:port"`. A bare id means port 0.
pub fn parse_endpoint(s: &str) -> GraphResult<(&str, usize)> {
    match s.rsplit_once(':') {
        None => Ok((s, 0)),
        Some((id, port)) => {
            let port = port.parse::<usize>().map_err(|_| {
                GraphError::validation(format!("endpoint '{s}' has a non-numeric port"))
            })?;
            Ok((id, port))
        }
    }
}

impl PipelineDef {
    pub fn from_path(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let f = File::open(path)
            .with_context(|| format!("open pipeline '{}'", path.display()))?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn from_reader(r: impl Read) -> GraphResult<Self> {
        let def: Self = serde_json::from_reader(r).context("parse pipeline JSON")?;
        Ok(def)
    }

    pub fn from_json(s: &str) -> GraphResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Check ids, kinds and link endpoints. Port ranges are checked at assembly, once atoms know
    /// their port counts.
    pub fn validate(&self) -> GraphResult<()> {
        if self.atoms.is_empty() {
            return Err(GraphError::validation("pipeline must declare at least one atom"));
        }
        let mut ids = HashSet::new();
        for atom in &self.atoms {
            if atom.id.is_empty() || atom.id.contains(':') {
                return Err(GraphError::validation(format!(
                    "atom id '{}' must be non-empty and must not contain ':'",
                    atom.id
                )));
            }
            if !ids.insert(atom.id.as_str()) {
                return Err(GraphError::validation(format!(
                    "duplicate atom id '{}'",
                    atom.id
                )));
            }
            if !ATOM_KINDS.contains(&atom.kind.as_str()) {
                return Err(GraphError::validation(format!(
                    "atom '{}' has unknown kind '{}'",
                    atom.id, atom.kind
                )));
            }
        }

        let mut sinks = HashSet::new();
        for link in &self.links {
            let (from, _) = parse_endpoint(&link.from)?;
            let (to, to_port) = parse_endpoint(&link.to)?;
            for id in [from, to] {
                if !ids.contains(id) {
                    return Err(GraphError::validation(format!(
                        "link '{} -> {}' references unknown atom '{id}'",
                        link.from, link.to
                    )));
                }
            }
            if from == to {
                return Err(GraphError::validation(format!(
                    "link '{} -> {}' connects an atom to itself",
                    link.from, link.to
                )));
            }
            if !sinks.insert((to, to_port)) {
                return Err(GraphError::validation(format!(
                    "sink '{}' has more than one incoming link",
                    link.to
                )));
            }
            if link.queue == Some(0) {
                return Err(GraphError::validation(format!(
                    "link '{} -> {}' must have a positive queue",
                    link.from, link.to
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/def.rs"]
mod tests;
