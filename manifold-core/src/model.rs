//! Field-layout resolution and the per-shape model cache.
//!
//! A [`TypeModel`] is the flattened encode/decode plan for one shape under
//! one set of layout options: embedded fields expanded depth-first, name
//! collisions resolved, each surviving field addressed by a slot path.
//! Models are built once per (shape identity, layout options) key and shared
//! immutably thereafter; a structural failure is cached the same way and
//! re-surfaces on every later request for that key.

use crate::descriptor::{RecordShape, ShapeId};
use crate::error::Error;
use dashmap::DashMap;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::OnceLock;

/// Embedding deeper than this is treated as a layout error.
const MAX_EMBED_DEPTH: usize = 64;

/// Handle options that change field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutOpts {
    pub struct_to_array: bool,
}

/// One resolved field in a model.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPlan {
    /// Name on the wire (declared name unless overridden).
    pub wire_name: String,
    /// Slot indices from the record root down to the field.
    pub path: Vec<usize>,
    /// Embedding depth the field was found at.
    pub depth: usize,
    pub omit_empty: bool,
    pub no_extension: bool,
}

/// The cached plan for one shape.
#[derive(Debug)]
pub struct TypeModel {
    shape_name: String,
    fields: Vec<FieldPlan>,
    by_name: FxHashMap<String, usize>,
}

impl TypeModel {
    pub fn shape_name(&self) -> &str {
        &self.shape_name
    }

    /// Resolved fields in deterministic order: first traversal occurrence of
    /// each surviving wire name. Stable across rebuilds of the same shape.
    pub fn fields(&self) -> &[FieldPlan] {
        &self.fields
    }

    pub fn field_index(&self, wire_name: &str) -> Option<usize> {
        self.by_name.get(wire_name).copied()
    }
}

struct Candidate {
    wire_name: String,
    explicit: bool,
    path: Vec<usize>,
    depth: usize,
    order: usize,
    omit_empty: bool,
    no_extension: bool,
}

fn collect(
    shape: &RecordShape,
    root_name: &str,
    depth: usize,
    prefix: &[usize],
    out: &mut Vec<Candidate>,
) -> Result<(), Error> {
    if depth > MAX_EMBED_DEPTH {
        return Err(Error::structural(root_name, "embedding nested too deeply"));
    }
    for (i, f) in shape.fields().iter().enumerate() {
        let mut path = prefix.to_vec();
        path.push(i);
        match f.embedded() {
            Some(nested) => collect(nested, root_name, depth + 1, &path, out)?,
            None => {
                let order = out.len();
                out.push(Candidate {
                    wire_name: f.wire_name().unwrap_or(f.name()).to_string(),
                    explicit: f.wire_name().is_some(),
                    path,
                    depth,
                    order,
                    omit_empty: f.is_omit_empty(),
                    no_extension: f.is_no_extension(),
                });
            }
        }
    }
    Ok(())
}

fn build_model(shape: &Arc<RecordShape>, opts: LayoutOpts) -> Result<Arc<TypeModel>, Error> {
    let mut candidates = Vec::new();
    collect(shape, shape.name(), 0, &[], &mut candidates)?;

    // Group by wire name, preserving first-seen order of names.
    let mut names: Vec<&str> = Vec::new();
    let mut groups: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
    for (i, c) in candidates.iter().enumerate() {
        groups
            .entry(c.wire_name.as_str())
            .or_insert_with(|| {
                names.push(c.wire_name.as_str());
                Vec::new()
            })
            .push(i);
    }

    let mut selected: Vec<usize> = Vec::with_capacity(names.len());
    for name in &names {
        let group = &groups[name];
        let explicit: Vec<usize> = group
            .iter()
            .copied()
            .filter(|&i| candidates[i].explicit)
            .collect();
        match explicit.len() {
            // An explicit wire name wins regardless of depth.
            1 => selected.push(explicit[0]),
            0 => {
                let min_depth = group.iter().map(|&i| candidates[i].depth).min().unwrap();
                let tied: Vec<usize> = group
                    .iter()
                    .copied()
                    .filter(|&i| candidates[i].depth == min_depth)
                    .collect();
                // Ambiguous at the shallowest depth: the name is dropped.
                if tied.len() == 1 {
                    selected.push(tied[0]);
                }
            }
            _ => {
                return Err(Error::structural(
                    shape.name(),
                    format!("duplicate wire name `{}`", name),
                ));
            }
        }
    }
    selected.sort_by_key(|&i| candidates[i].order);

    let fields: Vec<FieldPlan> = selected
        .into_iter()
        .map(|i| {
            let c = &candidates[i];
            FieldPlan {
                wire_name: c.wire_name.clone(),
                path: c.path.clone(),
                depth: c.depth,
                // Positional layout cannot skip slots.
                omit_empty: c.omit_empty && !opts.struct_to_array,
                no_extension: c.no_extension,
            }
        })
        .collect();

    let by_name = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.wire_name.clone(), i))
        .collect();

    tracing::debug!(
        shape = shape.name(),
        fields = fields.len(),
        struct_to_array = opts.struct_to_array,
        "built type model"
    );

    Ok(Arc::new(TypeModel {
        shape_name: shape.name().to_string(),
        fields,
        by_name,
    }))
}

enum Cached {
    // The shape Arc is retained so its address (the cache key) cannot be
    // reused by a later allocation.
    Ok {
        _shape: Arc<RecordShape>,
        model: Arc<TypeModel>,
    },
    Failed {
        _shape: Arc<RecordShape>,
        name: String,
        detail: String,
    },
}

fn cache() -> &'static DashMap<(ShapeId, LayoutOpts), Cached> {
    static CACHE: OnceLock<DashMap<(ShapeId, LayoutOpts), Cached>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

static BUILD_LOCK: Mutex<()> = Mutex::new(());

fn materialize(entry: &Cached) -> Result<Arc<TypeModel>, Error> {
    match entry {
        Cached::Ok { model, .. } => Ok(model.clone()),
        Cached::Failed { name, detail, .. } => Err(Error::structural(name, detail.clone())),
    }
}

/// Returns the model for a shape, building and publishing it on first use.
///
/// Published entries are read without blocking; builds for not-yet-cached
/// keys serialize on one lock so each model is built exactly once.
pub fn model_for(shape: &Arc<RecordShape>, opts: LayoutOpts) -> Result<Arc<TypeModel>, Error> {
    let key = (ShapeId::of(shape), opts);
    if let Some(entry) = cache().get(&key) {
        return materialize(&entry);
    }

    let _build = BUILD_LOCK.lock();
    if let Some(entry) = cache().get(&key) {
        return materialize(&entry);
    }

    let result = build_model(shape, opts);
    let entry = match &result {
        Ok(model) => Cached::Ok {
            _shape: shape.clone(),
            model: model.clone(),
        },
        Err(Error::Structural {
            shape: name,
            detail,
        }) => {
            tracing::warn!(shape = %name, %detail, "type model build failed");
            Cached::Failed {
                _shape: shape.clone(),
                name: name.clone(),
                detail: detail.clone(),
            }
        }
        // build_model only fails structurally
        Err(_) => unreachable!("model build raised a non-structural error"),
    };
    cache().insert(key, entry);
    result
}
