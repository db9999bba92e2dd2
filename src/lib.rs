#![forbid(unsafe_code)]

pub mod anim_ease;
pub mod app;
pub mod composite;
pub mod core;
pub mod error;
pub mod mask;
pub mod pipeline;
pub mod placer;
pub mod rng;
pub mod spatial;
pub mod sprite;
pub mod store;
pub mod transform;

pub use anim_ease::Ease;
pub use app::{
    CATEGORIES, Category, JarApp, JarEvent, Notification, TickOutput, category_by_name,
    category_name_list,
};
pub use core::{FrameRGBA, NormPoint, Point, Vec2};
pub use error::{CoinjarError, CoinjarResult};
pub use mask::{MaskField, jar_silhouette_contains};
pub use pipeline::{AnimationRecord, EntryState, RenderPipeline};
pub use placer::{Placement, PlacerConfig, sample_inside};
pub use rng::{Mulberry32, hash_string};
pub use spatial::SpatialIndex;
pub use sprite::{COIN_SIZE_CSS, CoinSprites, build_sprites};
pub use store::{STORAGE_KEY, Store, StoredEntry};
pub use transform::CanvasMetrics;
