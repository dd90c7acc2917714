//! The session identity registry: maps a (content reference, session name)
//! pair to a stable session id, preferring reuse over creation.
//!
//! Reuse priority, highest first:
//!   1. same infinite continuation chain + name
//!   2. same part instance + name
//!   3. identity bound to the immediately preceding part instance + name
//!      (continuation across a part boundary)
//!   4. lookahead placeholder scoped to the same Part + name (promoted)
//!   5. mint a new identity
//!
//! Lookups are key-indexed; garbage collection is a generation counter:
//! every hit stamps the identity with the current pass generation and
//! `finish_pass` retains only identities stamped this pass.

use std::collections::HashMap;
use std::fmt;

use timeline::types::{InfiniteId, PartId, PartInstanceId, SessionContentRef, SessionRef, TimelineFragment};

use crate::model::{SessionId, SessionIdentity};

/// Builds the full session name for a raw session reference.
///
/// Exclusive sessions ("give me my own session, don't merge with siblings")
/// substitute the content owner's unique id for the raw name.
pub fn compose_session_name(owner_id: &impl fmt::Display, session: &SessionRef) -> String {
    if session.exclusive {
        format!("{}_{}", session.pool, owner_id)
    } else {
        format!("{}_{}", session.pool, session.name)
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    identities: HashMap<SessionId, SessionIdentity>,
    by_infinite: HashMap<(InfiniteId, String), SessionId>,
    by_part_instance: HashMap<(PartInstanceId, String), SessionId>,
    lookahead_by_part: HashMap<(PartId, String), SessionId>,
    generation: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from the identities persisted by the last pass.
    pub fn from_identities(identities: Vec<SessionIdentity>) -> Self {
        let mut registry = Self::new();
        for identity in identities {
            registry.index(&identity);
            registry.identities.insert(identity.id, identity);
        }
        registry
    }

    /// Start a new pass: bump the generation. Identities are only kept at
    /// `finish_pass` if something stamped them with this generation.
    pub fn begin_pass(&mut self) {
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionIdentity> {
        self.identities.get(&id)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Resolve the identity for a concrete timed piece. Never fails: a new
    /// identity is minted when nothing can be reused.
    pub fn resolve_for_content(&mut self, content: &SessionContentRef, name: &str) -> SessionId {
        // 1. same infinite chain
        if let Some(infinite) = content.infinite_instance_id {
            if let Some(&id) = self.by_infinite.get(&(infinite, name.to_owned())) {
                self.touch(id);
                return id;
            }
        }

        // 2. already bound to the owning part instance
        if let Some(part_instance) = content.part_instance_id {
            if let Some(&id) = self.by_part_instance.get(&(part_instance, name.to_owned())) {
                self.touch(id);
                return id;
            }

            // 3. continuation from the immediately preceding part instance
            if let Some(previous) = content.previous_part_instance_id {
                if let Some(&id) = self.by_part_instance.get(&(previous, name.to_owned())) {
                    self.bind_part_instance(id, part_instance);
                    self.touch(id);
                    return id;
                }
            }

            // 4. promote a lookahead placeholder scoped to the same Part
            if let Some(&id) = self
                .lookahead_by_part
                .get(&(content.part_id, name.to_owned()))
            {
                self.lookahead_by_part
                    .remove(&(content.part_id, name.to_owned()));
                if let Some(identity) = self.identities.get_mut(&id) {
                    identity.lookahead_for_part_id = None;
                    if identity.infinite_instance_id.is_none() {
                        if let Some(infinite) = content.infinite_instance_id {
                            identity.infinite_instance_id = Some(infinite);
                            self.by_infinite.insert((infinite, name.to_owned()), id);
                        }
                    }
                }
                self.bind_part_instance(id, part_instance);
                self.touch(id);
                return id;
            }
        }

        // 5. mint a new identity. An infinite is bound to its chain only;
        // it picks up part instances as later passes see them.
        let id = SessionId::new_v4();
        let identity = SessionIdentity {
            id,
            name: name.to_owned(),
            infinite_instance_id: content.infinite_instance_id,
            part_instance_ids: if content.infinite_instance_id.is_some() {
                Vec::new()
            } else {
                content.part_instance_id.into_iter().collect()
            },
            lookahead_for_part_id: None,
            touched: self.generation,
        };
        self.index(&identity);
        self.identities.insert(id, identity);
        id
    }

    /// Resolve the identity for a rendered timeline fragment.
    ///
    /// Lookahead fragments find-or-create a placeholder scoped to their
    /// Part. Returns None when the fragment references content the registry
    /// has no record of; the caller logs it and leaves the fragment alone.
    pub fn resolve_for_fragment(
        &mut self,
        fragment: &TimelineFragment,
        name: &str,
    ) -> Option<SessionId> {
        if let Some(infinite) = fragment.infinite_instance_id {
            if let Some(&id) = self.by_infinite.get(&(infinite, name.to_owned())) {
                self.touch(id);
                return Some(id);
            }
        }

        if let Some(part_instance) = fragment.part_instance_id {
            if let Some(&id) = self.by_part_instance.get(&(part_instance, name.to_owned())) {
                self.touch(id);
                return Some(id);
            }
        }

        if fragment.lookahead {
            if let Some(part_id) = fragment.part_id {
                if let Some(&id) = self.lookahead_by_part.get(&(part_id, name.to_owned())) {
                    self.touch(id);
                    return Some(id);
                }

                let id = SessionId::new_v4();
                let identity = SessionIdentity {
                    id,
                    name: name.to_owned(),
                    infinite_instance_id: None,
                    part_instance_ids: Vec::new(),
                    lookahead_for_part_id: Some(part_id),
                    touched: self.generation,
                };
                self.index(&identity);
                self.identities.insert(id, identity);
                return Some(id);
            }
        }

        None
    }

    /// End of pass: drop every identity not touched this generation and
    /// return the survivors (sorted by id for stable persistence).
    pub fn finish_pass(&mut self) -> Vec<SessionIdentity> {
        let generation = self.generation;
        self.identities.retain(|_, identity| identity.touched == generation);

        self.by_infinite.clear();
        self.by_part_instance.clear();
        self.lookahead_by_part.clear();
        let identities: Vec<SessionIdentity> = {
            let mut all: Vec<_> = self.identities.values().cloned().collect();
            all.sort_by_key(|identity| identity.id);
            all
        };
        for identity in &identities {
            self.index(identity);
        }
        identities
    }

    fn touch(&mut self, id: SessionId) {
        if let Some(identity) = self.identities.get_mut(&id) {
            identity.touched = self.generation;
        }
    }

    fn bind_part_instance(&mut self, id: SessionId, part_instance: PartInstanceId) {
        if let Some(identity) = self.identities.get_mut(&id) {
            if !identity.part_instance_ids.contains(&part_instance) {
                identity.part_instance_ids.push(part_instance);
            }
            self.by_part_instance
                .insert((part_instance, identity.name.clone()), id);
        }
    }

    fn index(&mut self, identity: &SessionIdentity) {
        if let Some(infinite) = identity.infinite_instance_id {
            self.by_infinite
                .insert((infinite, identity.name.clone()), identity.id);
        }
        for &part_instance in &identity.part_instance_ids {
            self.by_part_instance
                .insert((part_instance, identity.name.clone()), identity.id);
        }
        if let Some(part_id) = identity.lookahead_for_part_id {
            self.lookahead_by_part
                .insert((part_id, identity.name.clone()), identity.id);
        }
    }
}
