use tracing::{debug, warn};

use crate::core::{FrameRGBA, NormPoint};
use crate::error::{CoinjarError, CoinjarResult};
use crate::mask::MaskField;
use crate::pipeline::{RenderPipeline, drop_duration_ms};
use crate::placer::{PlacerConfig, sample_inside};
use crate::rng::Mulberry32;
use crate::sprite::{CoinSprites, build_sprites};
use crate::store::{Store, StoredEntry, iso8601_utc};
use crate::transform::CanvasMetrics;

/// Quiet period for coalescing resize streams before rebuilding sprites.
pub const RESIZE_DEBOUNCE_MS: f64 = 150.0;

/// Fraction of the drop duration after which the clink cue fires.
const CLINK_AT_FRACTION: f64 = 0.65;

/// Margin used when re-validating previously stored positions on load.
const REPAIR_PAD_PX: f64 = 50.0;

#[derive(Clone, Copy, Debug)]
pub struct Category {
    pub name: &'static str,
    pub color: &'static str,
}

pub const CATEGORIES: &[Category] = &[
    Category { name: "Nonsense Request Coin", color: "#a855f7" },
    Category { name: "It's Not the Data Coin", color: "#f59e0b" },
    Category { name: "Magic Wand Coin", color: "#8b5cf6" },
    Category { name: "Chaos Coin", color: "#ef4444" },
    Category { name: "Shrug it off Coin", color: "#64748b" },
    Category { name: "Click Support Coin", color: "#3b82f6" },
];

pub fn category_by_name(name: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.name == name)
}

pub fn category_name_list() -> Vec<&'static str> {
    CATEGORIES.iter().map(|c| c.name).collect()
}

/// Mutations the UI collaborator can request.
#[derive(Clone, Debug)]
pub enum JarEvent {
    Add { category: String, text: String },
    Delete { id: String },
    Reset,
    Resize { css_width: f64, css_height: f64, dpr: f64 },
}

/// Outputs the core produces for its collaborators. `Clink` drives the audio
/// cue; it is fire-and-forget and never awaited.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    CoinPlaced { id: String },
    PlacementDegraded { id: String },
    Clink { id: String },
}

#[derive(Debug, Default)]
pub struct TickOutput {
    pub frame: Option<FrameRGBA>,
    pub notifications: Vec<Notification>,
}

#[derive(Clone, Copy, Debug)]
struct PendingResize {
    css_width: f64,
    css_height: f64,
    dpr: f64,
    deadline_ms: f64,
}

/// Owns all mutable jar state: the entry collection, the animation set, the
/// static-layer cache, and the live canvas metrics. Single writer, driven by
/// explicit `handle`/`tick` calls; the only suspension point is between
/// frames, outside this type.
pub struct JarApp {
    store: Store,
    entries: Vec<StoredEntry>,
    mask: Option<MaskField>,
    pipeline: RenderPipeline,
    sprites: CoinSprites,
    css_width: f64,
    css_height: f64,
    dpr: f64,
    placer_cfg: PlacerConfig,
    pending_resize: Option<PendingResize>,
    pending_cues: Vec<(String, f64)>,
    id_counter: u64,
}

impl JarApp {
    /// Load the snapshot, repair unresolved or invalid positions, and persist
    /// the repaired collection.
    pub fn open(
        store: Store,
        mask: Option<MaskField>,
        css_width: f64,
        css_height: f64,
        dpr: f64,
    ) -> CoinjarResult<Self> {
        let metrics = CanvasMetrics::fit(css_width, css_height, dpr)?;
        let sprites = build_sprites(&metrics)?;
        let entries = store.load();
        let mut app = Self {
            store,
            entries,
            mask,
            pipeline: RenderPipeline::new(),
            sprites,
            css_width,
            css_height,
            dpr,
            placer_cfg: PlacerConfig::default(),
            pending_resize: None,
            pending_cues: Vec::new(),
            id_counter: 0,
        };
        app.ensure_all_inside()?;
        Ok(app)
    }

    pub fn metrics(&self) -> CoinjarResult<CanvasMetrics> {
        CanvasMetrics::fit(self.css_width, self.css_height, self.dpr)
    }

    pub fn entries(&self) -> &[StoredEntry] {
        &self.entries
    }

    pub fn mask(&self) -> Option<&MaskField> {
        self.mask.as_ref()
    }

    /// Atomically swap in a higher-quality mask. Placement and masking use
    /// only the new field from the next query on.
    pub fn set_mask(&mut self, mask: MaskField) {
        debug!(width = mask.width(), height = mask.height(), "mask field replaced");
        self.mask = Some(mask);
        self.pipeline.mark_static_dirty();
    }

    pub fn needs_frame(&self) -> bool {
        self.pipeline.needs_frame() || self.pending_resize.is_some()
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn handle(&mut self, event: JarEvent, now_ms: f64) -> CoinjarResult<Vec<Notification>> {
        match event {
            JarEvent::Add { category, text } => self.add_entry(category, text, now_ms),
            JarEvent::Delete { id } => {
                self.delete_entry(&id)?;
                Ok(Vec::new())
            }
            JarEvent::Reset => {
                self.reset()?;
                Ok(Vec::new())
            }
            JarEvent::Resize { css_width, css_height, dpr } => {
                // Coalesce bursts: only the last geometry after a quiet
                // period is applied.
                self.pending_resize = Some(PendingResize {
                    css_width,
                    css_height,
                    dpr,
                    deadline_ms: now_ms + RESIZE_DEBOUNCE_MS,
                });
                Ok(Vec::new())
            }
        }
    }

    /// One cooperative scheduler step: apply a matured resize, advance
    /// animations, emit due audio cues, and draw a frame if one is needed.
    pub fn tick(&mut self, now_ms: f64) -> CoinjarResult<TickOutput> {
        let mut out = TickOutput::default();

        if let Some(pending) = self.pending_resize
            && now_ms >= pending.deadline_ms
        {
            self.apply_resize(pending)?;
        }

        self.pipeline.advance(now_ms);

        self.pending_cues.retain(|(id, due)| {
            if now_ms >= *due {
                out.notifications.push(Notification::Clink { id: id.clone() });
                false
            } else {
                true
            }
        });

        if self.pipeline.needs_frame() {
            out.frame = Some(self.render_frame(now_ms)?);
        }
        Ok(out)
    }

    /// Draw a frame unconditionally, regardless of scheduling state.
    pub fn render_frame(&mut self, now_ms: f64) -> CoinjarResult<FrameRGBA> {
        // Metrics are recomputed from the live geometry every frame; a frame
        // computed against stale dimensions self-heals on the next one.
        let metrics = self.metrics()?;
        let placed: Vec<(&str, NormPoint)> = self
            .entries
            .iter()
            .filter_map(|e| e.pos.map(|p| (e.id.as_str(), p)))
            .collect();
        self.pipeline
            .render(&placed, &metrics, &self.sprites, self.mask.as_ref(), now_ms)
    }

    /// Restart an existing entry's drop animation (frame-replay support).
    /// Returns the drop duration so callers can size the replay window.
    pub fn replay_drop(&mut self, id: &str, now_ms: f64) -> CoinjarResult<f64> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| CoinjarError::validation(format!("no entry with id '{id}'")))?;
        let target = entry
            .pos
            .ok_or_else(|| CoinjarError::placement(format!("entry '{id}' has no position")))?;
        let mut rng = Mulberry32::from_str_seed(id);
        let duration = drop_duration_ms(&mut rng);
        self.pipeline.remove(id);
        self.pipeline
            .begin_drop(id, self.placer_cfg.drop_origin, target, now_ms, duration);
        Ok(duration)
    }

    /// Current `{entries, positions}` snapshot for list rendering and export.
    pub fn snapshot(&self) -> Vec<StoredEntry> {
        self.entries.clone()
    }

    /// CSV rendition of the snapshot: `id,category,text,created_iso`.
    pub fn export_csv(&self) -> String {
        let mut rows = vec!["id,category,text,created_iso".to_string()];
        for e in &self.entries {
            rows.push(
                [
                    csv_cell(&e.id),
                    csv_cell(&e.category),
                    csv_cell(&e.text),
                    csv_cell(&iso8601_utc(e.created_ms)),
                ]
                .join(","),
            );
        }
        rows.join("\r\n")
    }

    fn add_entry(
        &mut self,
        category: String,
        text: String,
        now_ms: f64,
    ) -> CoinjarResult<Vec<Notification>> {
        if category.trim().is_empty() || text.trim().is_empty() {
            return Err(CoinjarError::validation(
                "entry category and text must be non-empty",
            ));
        }

        self.id_counter += 1;
        let id = format!("coin-{}-{:04}", now_ms as i64, self.id_counter);
        let metrics = self.metrics()?;
        let existing: Vec<NormPoint> = self.entries.iter().filter_map(|e| e.pos).collect();
        let placed = sample_inside(
            &id,
            &existing,
            self.mask.as_ref(),
            &metrics,
            &self.placer_cfg,
        );

        self.entries.push(StoredEntry {
            id: id.clone(),
            category,
            text,
            created_ms: now_ms as i64,
            pos: Some(placed.point),
        });
        self.store.save(&self.entries)?;

        let mut rng = Mulberry32::from_str_seed(&id);
        let duration = drop_duration_ms(&mut rng);
        self.pipeline.begin_drop(
            &id,
            self.placer_cfg.drop_origin,
            placed.point,
            now_ms,
            duration,
        );
        self.pending_cues
            .push((id.clone(), now_ms + duration * CLINK_AT_FRACTION));

        let mut notes = vec![Notification::CoinPlaced { id: id.clone() }];
        if placed.fallback {
            notes.push(Notification::PlacementDegraded { id });
        }
        Ok(notes)
    }

    /// Remove the entry, its animation record, and any pending cue in one
    /// synchronous step; a subsequent frame neither references nor draws it.
    fn delete_entry(&mut self, id: &str) -> CoinjarResult<()> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return Err(CoinjarError::validation(format!("no entry with id '{id}'")));
        }
        self.pipeline.remove(id);
        self.pending_cues.retain(|(cue_id, _)| cue_id != id);
        self.store.save(&self.entries)
    }

    fn reset(&mut self) -> CoinjarResult<()> {
        self.entries.clear();
        self.pending_cues.clear();
        self.pipeline.clear();
        self.store.save(&self.entries)
    }

    fn apply_resize(&mut self, pending: PendingResize) -> CoinjarResult<()> {
        self.css_width = pending.css_width;
        self.css_height = pending.css_height;
        self.dpr = pending.dpr;
        let metrics = self.metrics()?;
        self.sprites = build_sprites(&metrics)?;
        self.pipeline.mark_static_dirty();
        self.pending_resize = None;
        debug!(
            css_width = pending.css_width,
            css_height = pending.css_height,
            dpr = pending.dpr,
            "resize applied"
        );
        Ok(())
    }

    /// Re-place entries whose position is missing or no longer solidly inside
    /// the silhouette, each seeing only the already-validated prefix.
    fn ensure_all_inside(&mut self) -> CoinjarResult<()> {
        let metrics = self.metrics()?;
        let mut validated: Vec<NormPoint> = Vec::new();
        let mut repaired = 0usize;
        for i in 0..self.entries.len() {
            let valid = self.entries[i].pos.is_some_and(|p| match &self.mask {
                Some(m) => m.inside_padded(p.x, p.y, REPAIR_PAD_PX),
                None => crate::mask::jar_silhouette_contains(p.x, p.y),
            });
            if !valid {
                let seed = self.entries[i].id.clone();
                let placed =
                    sample_inside(&seed, &validated, self.mask.as_ref(), &metrics, &self.placer_cfg);
                self.entries[i].pos = Some(placed.point);
                repaired += 1;
            }
            // pos is always Some past this point
            if let Some(p) = self.entries[i].pos {
                validated.push(p);
            }
        }
        if repaired > 0 {
            warn!(repaired, "re-placed entries with missing or invalid positions");
            self.store.save(&self.entries)?;
        }
        Ok(())
    }
}

fn csv_cell(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> Store {
        let path = std::env::temp_dir().join(format!(
            "coinjar_app_{name}_{}_{:?}.json",
            std::process::id(),
            std::thread::current().id()
        ));
        let _ = std::fs::remove_file(&path);
        Store::new(path)
    }

    fn open_app(name: &str) -> JarApp {
        JarApp::open(temp_store(name), None, 600.0, 800.0, 1.0).unwrap()
    }

    fn add(app: &mut JarApp, now_ms: f64) -> String {
        let notes = app
            .handle(
                JarEvent::Add {
                    category: "Chaos Coin".into(),
                    text: "it broke".into(),
                },
                now_ms,
            )
            .unwrap();
        match &notes[0] {
            Notification::CoinPlaced { id } => id.clone(),
            other => panic!("unexpected notification {other:?}"),
        }
    }

    #[test]
    fn add_places_persists_and_animates() {
        let mut app = open_app("add");
        let id = add(&mut app, 1000.0);
        assert!(app.pipeline().is_animating(&id));
        assert_eq!(app.entries().len(), 1);
        assert!(app.entries()[0].pos.is_some());
        assert!(app.needs_frame());

        // A reopened app sees the persisted entry.
        let store = Store::new(app.store.path().to_path_buf());
        let reopened = JarApp::open(store, None, 600.0, 800.0, 1.0).unwrap();
        assert_eq!(reopened.entries().len(), 1);
        let _ = std::fs::remove_file(app.store.path());
    }

    #[test]
    fn add_rejects_blank_input() {
        let mut app = open_app("blank");
        let err = app.handle(
            JarEvent::Add {
                category: "  ".into(),
                text: "x".into(),
            },
            0.0,
        );
        assert!(err.is_err());
    }

    #[test]
    fn delete_mid_animation_is_atomic() {
        let mut app = open_app("atomic_delete");
        let id = add(&mut app, 0.0);
        assert!(app.pipeline().is_animating(&id));

        app.handle(JarEvent::Delete { id: id.clone() }, 10.0).unwrap();
        assert!(app.entries().is_empty());
        assert!(!app.pipeline().is_animating(&id));
        assert!(app.pipeline().animation(&id).is_none());

        // Clink cue for the deleted coin never fires.
        let out = app.tick(10_000.0).unwrap();
        assert!(out.notifications.is_empty());
        let _ = std::fs::remove_file(app.store.path());
    }

    #[test]
    fn delete_unknown_id_errors() {
        let mut app = open_app("delete_unknown");
        assert!(app.handle(JarEvent::Delete { id: "nope".into() }, 0.0).is_err());
    }

    #[test]
    fn clink_fires_partway_through_drop() {
        let mut app = open_app("clink");
        let id = add(&mut app, 0.0);
        let duration = app.pipeline().animation(&id).unwrap().duration_ms;

        let early = app.tick(duration * 0.5).unwrap();
        assert!(!early.notifications.contains(&Notification::Clink { id: id.clone() }));

        let later = app.tick(duration * 0.7).unwrap();
        assert!(later.notifications.contains(&Notification::Clink { id: id.clone() }));

        // Cue fires exactly once.
        let again = app.tick(duration).unwrap();
        assert!(again.notifications.is_empty());
        let _ = std::fs::remove_file(app.store.path());
    }

    #[test]
    fn drop_settles_then_pipeline_goes_idle() {
        let mut app = open_app("settle_idle");
        add(&mut app, 0.0);
        // Past the longest possible drop: the coin lands, the sparkle starts.
        let landed = app.tick(2000.0).unwrap();
        assert!(landed.frame.is_some());
        // Past the sparkle window: the coin settles and the cache flushes.
        let flush = app.tick(2400.0).unwrap();
        assert!(flush.frame.is_some());
        // Idle afterwards: nothing schedules further draws.
        let idle = app.tick(2500.0).unwrap();
        assert!(idle.frame.is_none());
        assert!(!app.needs_frame());
        let _ = std::fs::remove_file(app.store.path());
    }

    #[test]
    fn resize_is_debounced_to_last_event() {
        let mut app = open_app("resize");
        add(&mut app, 0.0);
        let _ = app.tick(2000.0).unwrap();

        app.handle(JarEvent::Resize { css_width: 300.0, css_height: 400.0, dpr: 1.0 }, 2100.0)
            .unwrap();
        app.handle(JarEvent::Resize { css_width: 900.0, css_height: 1200.0, dpr: 2.0 }, 2120.0)
            .unwrap();

        // Quiet period measured from the last event: not yet applied.
        let _ = app.tick(2120.0 + RESIZE_DEBOUNCE_MS - 1.0).unwrap();
        assert!(app.pending_resize.is_some());

        let out = app.tick(2120.0 + RESIZE_DEBOUNCE_MS).unwrap();
        let frame = out.frame.expect("resize must trigger a redraw");
        assert_eq!((frame.width, frame.height), (1800, 2400));
        let _ = std::fs::remove_file(app.store.path());
    }

    #[test]
    fn reset_clears_everything() {
        let mut app = open_app("reset");
        add(&mut app, 0.0);
        add(&mut app, 1.0);
        app.handle(JarEvent::Reset, 2.0).unwrap();
        assert!(app.entries().is_empty());
        assert!(!app.pipeline().is_animating("anything"));
        assert_eq!(app.store.load(), Vec::new());
        let _ = std::fs::remove_file(app.store.path());
    }

    #[test]
    fn ensure_inside_repairs_outside_positions() {
        let store = temp_store("repair");
        store
            .save(&[
                StoredEntry {
                    id: "ok".into(),
                    category: "Chaos Coin".into(),
                    text: "fine".into(),
                    created_ms: 0,
                    pos: Some(NormPoint::new(0.5, 0.7)),
                },
                StoredEntry {
                    id: "lost".into(),
                    category: "Chaos Coin".into(),
                    text: "no position".into(),
                    created_ms: 1,
                    pos: None,
                },
                StoredEntry {
                    id: "outside".into(),
                    category: "Chaos Coin".into(),
                    text: "escaped the jar".into(),
                    created_ms: 2,
                    pos: Some(NormPoint::new(0.01, 0.01)),
                },
            ])
            .unwrap();

        let app = JarApp::open(store, None, 600.0, 800.0, 1.0).unwrap();
        for e in app.entries() {
            let p = e.pos.expect("all entries placed after open");
            assert!(crate::mask::jar_silhouette_contains(p.x, p.y));
        }
        // The valid entry kept its stored position.
        assert_eq!(app.entries()[0].pos, Some(NormPoint::new(0.5, 0.7)));
        let _ = std::fs::remove_file(app.store.path());
    }

    #[test]
    fn csv_escapes_quotes_and_commas() {
        let store = temp_store("csv");
        store
            .save(&[StoredEntry {
                id: "a".into(),
                category: "Chaos Coin".into(),
                text: "said \"no\", twice".into(),
                created_ms: 0,
                pos: None,
            }])
            .unwrap();
        let app = JarApp::open(store, None, 600.0, 800.0, 1.0).unwrap();
        let csv = app.export_csv();
        assert!(csv.starts_with("id,category,text,created_iso"));
        assert!(csv.contains("\"said \"\"no\"\", twice\""));
        assert!(csv.contains("1970-01-01T00:00:00Z"));
        let _ = std::fs::remove_file(app.store.path());
    }

    #[test]
    fn category_table_lookup() {
        assert!(category_by_name("Chaos Coin").is_some());
        assert!(category_by_name("Unknown Coin").is_none());
        assert_eq!(CATEGORIES.len(), 6);
    }
}
