//! The entity registry (story bible)
//!
//! Registry mutations are the only place continuity state changes. Validators
//! receive `&EntityRegistry` and can only read it.

use crate::entity::{CharacterEntry, Motif, PlotThread, Role, RoleTransition};
use crate::payload::{CharacterPayload, EntityKind, EntityPayload, MotifPayload, ThreadPayload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Recoverable continuity problem found while registering a mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityViolation {
    pub scene_index: usize,
    pub kind: ContinuityKind,
}

/// What went wrong with a mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContinuityKind {
    /// Role differs from the recorded one and no transition was requested
    RoleConflict {
        name: String,
        recorded: Role,
        proposed: Role,
    },
    /// Mention failed its schema check
    MalformedPayload { entity: EntityKind, reason: String },
}

impl fmt::Display for ContinuityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ContinuityKind::RoleConflict {
                name,
                recorded,
                proposed,
            } => write!(
                f,
                "scene {}: {name} is recorded as {recorded} but appears as {proposed} without a flagged transition",
                self.scene_index
            ),
            ContinuityKind::MalformedPayload { entity, reason } => {
                write!(f, "scene {}: malformed {entity} mention: {reason}", self.scene_index)
            }
        }
    }
}

/// Outcome of [`EntityRegistry::register_or_validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// First sighting, entry created
    Registered { kind: EntityKind, key: String },
    /// Existing entry consistent with the mention
    Confirmed { kind: EntityKind, key: String },
    /// Flagged role change applied and recorded
    Transitioned { name: String, from: Role, to: Role },
    /// Soft violation; the registry keeps its prior record
    Violation(ContinuityViolation),
}

impl ValidationResult {
    /// Whether the mention produced a violation
    #[inline]
    #[must_use]
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Violation(_))
    }

    /// The violation, if any
    #[inline]
    #[must_use]
    pub fn violation(&self) -> Option<&ContinuityViolation> {
        match self {
            Self::Violation(v) => Some(v),
            _ => None,
        }
    }
}

/// Consistency ledger of characters, plot threads and motifs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityRegistry {
    characters: BTreeMap<String, CharacterEntry>,
    threads: BTreeMap<String, PlotThread>,
    motifs: BTreeMap<String, Motif>,
    /// Every soft violation ever recorded, in order
    violations: Vec<ContinuityViolation>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl EntityRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new entity or validate a mention against the record.
    ///
    /// `payload` is the raw mention; it is schema-checked against `kind`
    /// first and a malformed payload is reported as a violation, never
    /// applied.
    pub fn register_or_validate(
        &mut self,
        kind: EntityKind,
        payload: &serde_json::Value,
        scene_index: usize,
    ) -> ValidationResult {
        match EntityPayload::parse(kind, payload) {
            Ok(parsed) => self.apply(parsed, scene_index),
            Err(e) => self.record(ContinuityViolation {
                scene_index,
                kind: ContinuityKind::MalformedPayload {
                    entity: kind,
                    reason: e.to_string(),
                },
            }),
        }
    }

    /// Apply an already schema-checked payload
    pub fn apply(&mut self, payload: EntityPayload, scene_index: usize) -> ValidationResult {
        match payload {
            EntityPayload::Character(p) => self.apply_character(p, scene_index),
            EntityPayload::Thread(p) => self.apply_thread(&p, scene_index),
            EntityPayload::Motif(p) => self.apply_motif(p),
        }
    }

    fn apply_character(&mut self, p: CharacterPayload, scene_index: usize) -> ValidationResult {
        let k = key(&p.name);
        let Some(entry) = self.characters.get_mut(&k) else {
            let mut entry = CharacterEntry::new(p.name.trim(), p.role, scene_index);
            entry.relationships = p.relationships;
            self.characters.insert(k.clone(), entry);
            return ValidationResult::Registered {
                kind: EntityKind::Character,
                key: k,
            };
        };

        entry.touch(scene_index);
        entry.relationships.extend(p.relationships);

        if entry.role == p.role {
            return ValidationResult::Confirmed {
                kind: EntityKind::Character,
                key: k,
            };
        }

        if p.role_transition {
            let from = entry.role;
            entry.transitions.push(RoleTransition {
                from,
                to: p.role,
                scene_index,
            });
            entry.role = p.role;
            tracing::info!(
                character = %entry.name,
                %from,
                to = %p.role,
                scene_index,
                "Recorded role transition"
            );
            return ValidationResult::Transitioned {
                name: entry.name.clone(),
                from,
                to: p.role,
            };
        }

        let violation = ContinuityViolation {
            scene_index,
            kind: ContinuityKind::RoleConflict {
                name: entry.name.clone(),
                recorded: entry.role,
                proposed: p.role,
            },
        };
        self.record(violation)
    }

    fn apply_thread(&mut self, p: &ThreadPayload, scene_index: usize) -> ValidationResult {
        let k = key(&p.label);
        let result = match self.threads.get_mut(&k) {
            Some(thread) => {
                thread.last_referenced = thread.last_referenced.max(scene_index);
                thread.introduced_at = thread.introduced_at.min(scene_index);
                ValidationResult::Confirmed {
                    kind: EntityKind::Thread,
                    key: k.clone(),
                }
            }
            None => {
                self.threads
                    .insert(k.clone(), PlotThread::new(p.label.trim(), scene_index));
                ValidationResult::Registered {
                    kind: EntityKind::Thread,
                    key: k.clone(),
                }
            }
        };
        if p.resolved {
            if let Some(thread) = self.threads.get_mut(&k) {
                thread.resolved = true;
            }
        }
        result
    }

    fn apply_motif(&mut self, p: MotifPayload) -> ValidationResult {
        let k = key(&p.label);
        let existed = self.motifs.contains_key(&k);
        self.record_manifestation(&p.label, p.act, p.manifestation);
        if existed {
            ValidationResult::Confirmed {
                kind: EntityKind::Motif,
                key: k,
            }
        } else {
            ValidationResult::Registered {
                kind: EntityKind::Motif,
                key: k,
            }
        }
    }

    fn record(&mut self, violation: ContinuityViolation) -> ValidationResult {
        tracing::warn!(%violation, "Continuity violation");
        self.violations.push(violation.clone());
        ValidationResult::Violation(violation)
    }

    /// Record how a motif manifests in `act` (latest text per act wins)
    pub fn record_manifestation(&mut self, label: &str, act: u8, text: impl Into<String>) {
        self.motifs
            .entry(key(label))
            .or_insert_with(|| Motif::new(label.trim()))
            .manifestations
            .insert(act, text.into());
    }

    /// Unresolved threads last referenced more than `window` scenes before
    /// `current_scene_index`, oldest reference first
    #[must_use]
    pub fn sweep_dropped_threads(&self, current_scene_index: usize, window: usize) -> Vec<&PlotThread> {
        let mut dropped: Vec<&PlotThread> = self
            .threads
            .values()
            .filter(|t| t.is_dropped(current_scene_index, window))
            .collect();
        dropped.sort_by(|a, b| {
            a.last_referenced
                .cmp(&b.last_referenced)
                .then_with(|| a.label.cmp(&b.label))
        });
        dropped
    }

    /// Fraction of tracked motifs that evolved across acts.
    ///
    /// Returns 1.0 when no motif is tracked.
    #[must_use]
    pub fn evolution_score(&self, min_distance: f64) -> f64 {
        if self.motifs.is_empty() {
            return 1.0;
        }
        let evolved = self
            .motifs
            .values()
            .filter(|m| m.is_evolved(min_distance))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let score = evolved as f64 / self.motifs.len() as f64;
        score
    }

    /// Motifs that did not evolve
    #[must_use]
    pub fn static_motifs(&self, min_distance: f64) -> Vec<&Motif> {
        self.motifs
            .values()
            .filter(|m| !m.is_evolved(min_distance))
            .collect()
    }

    /// Character by name (case-insensitive)
    #[must_use]
    pub fn character(&self, name: &str) -> Option<&CharacterEntry> {
        self.characters.get(&key(name))
    }

    /// Thread by label (case-insensitive)
    #[must_use]
    pub fn thread(&self, label: &str) -> Option<&PlotThread> {
        self.threads.get(&key(label))
    }

    /// Motif by label (case-insensitive)
    #[must_use]
    pub fn motif(&self, label: &str) -> Option<&Motif> {
        self.motifs.get(&key(label))
    }

    /// All characters, by name
    pub fn characters(&self) -> impl Iterator<Item = &CharacterEntry> {
        self.characters.values()
    }

    /// All threads, by label
    pub fn threads(&self) -> impl Iterator<Item = &PlotThread> {
        self.threads.values()
    }

    /// All motifs, by label
    pub fn motifs(&self) -> impl Iterator<Item = &Motif> {
        self.motifs.values()
    }

    /// Threads not yet resolved
    pub fn unresolved_threads(&self) -> impl Iterator<Item = &PlotThread> {
        self.threads.values().filter(|t| !t.resolved)
    }

    /// Violation log
    #[inline]
    #[must_use]
    pub fn violations(&self) -> &[ContinuityViolation] {
        &self.violations
    }

    /// Whether every character's role history is transition-consistent
    #[must_use]
    pub fn lineages_consistent(&self) -> bool {
        self.characters.values().all(CharacterEntry::lineage_is_consistent)
    }
}
