//! Conditional index updates: reference dedup and staleness refresh.
//!
//! The updater is the single place that decides whether an already-indexed
//! resource needs mutation. Keeping the dedup and staleness policy here
//! means concurrent workers can race on the same ID and at worst cause a
//! redundant refresh, never divergent documents.

use std::time::Duration;

use chrono::Utc;
use tracing::trace;
use trawl_core::{Reference, ReferencedResource};

use crate::index::{Index, IndexError, IndexKind, Indexes, types};

/// Outcome of an update decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateStatus {
  #[default]
  Undefined,
  /// No document anywhere: first sighting, needs full classification.
  NotFound,
  /// Previously recorded invalid. Terminal; never reconsidered.
  Invalid,
  /// The stored document was mutated (new reference and/or refreshed
  /// last-seen).
  Updated,
  /// Already indexed and fresh; nothing to do.
  UpToDate,
}

impl std::fmt::Display for UpdateStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      UpdateStatus::Undefined => "undefined",
      UpdateStatus::NotFound => "not found",
      UpdateStatus::Invalid => "invalid",
      UpdateStatus::Updated => "updated",
      UpdateStatus::UpToDate => "up to date",
    };
    f.write_str(s)
  }
}

pub struct Updater {
  indexes: Indexes,
  min_age: chrono::Duration,
}

impl Updater {
  pub fn new(indexes: Indexes, min_age: Duration) -> Self {
    Self {
      indexes,
      min_age: chrono::Duration::from_std(min_age).expect("min_age fits in a signed duration"),
    }
  }

  /// Decide whether the index needs mutation for `r` and apply it.
  ///
  /// Index I/O failures surface unmodified; retry policy belongs to the
  /// worker pool at the delivery level.
  pub async fn update(&self, r: &ReferencedResource) -> Result<UpdateStatus, IndexError> {
    let Some((kind, mut doc)) = self.indexes.multi_get(r.id(), &["references", "last-seen"]).await? else {
      return Ok(UpdateStatus::NotFound);
    };

    if kind == IndexKind::Invalids {
      return Ok(UpdateStatus::Invalid);
    }

    let mut dirty = false;

    if let Some(reference) = &r.reference
      && !has_reference(&doc.references, reference, r)
    {
      doc
        .references
        .push(types::Reference::new(&reference.parent.id, &reference.name));
      dirty = true;
    }

    let now = Utc::now();
    if now - doc.last_seen > self.min_age {
      doc.last_seen = now;
      dirty = true;
    }

    if dirty {
      self.indexes.by_kind(kind).update(r.id(), &doc).await?;
      trace!(id = %r.id(), references = doc.references.len(), "document updated");
      return Ok(UpdateStatus::Updated);
    }

    Ok(UpdateStatus::UpToDate)
  }
}

/// Dedup test against the stored reference list: match by parent ID alone.
///
/// # Panics
///
/// When the incoming reference's parent belongs to a different protocol
/// than the resource. The indices are a single-protocol namespace;
/// comparing across protocols indicates a broken invariant upstream.
fn has_reference(refs: &types::References, new_ref: &Reference, r: &ReferencedResource) -> bool {
  if new_ref.parent.protocol != r.resource.protocol {
    panic!(
      "unmatching protocols in reference: {} vs {}",
      new_ref.parent.protocol, r.resource.protocol
    );
  }

  refs.has_parent(&new_ref.parent.id)
}
