use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use coinjar::{
    JarApp, JarEvent, MaskField, Notification, Store, category_name_list, pipeline::SPARKLE_WINDOW_MS,
};

#[derive(Parser, Debug)]
#[command(name = "coinjar", version)]
struct Cli {
    /// Snapshot file holding the entry collection.
    #[arg(long, default_value = "coinjar-entries-v1.json")]
    store: PathBuf,

    /// Optional jar silhouette bitmap (falls back to the analytic outline).
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Canvas CSS width used for placement and rendering.
    #[arg(long, default_value_t = 600.0)]
    width: f64,

    /// Canvas CSS height used for placement and rendering.
    #[arg(long, default_value_t = 800.0)]
    height: f64,

    /// Device pixel ratio (clamped to [1,3]).
    #[arg(long, default_value_t = 1.0)]
    dpr: f64,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a coin to the jar.
    Add {
        /// Coin category (one of the fixed set).
        #[arg(long)]
        category: String,
        /// Entry text.
        #[arg(long)]
        text: String,
    },
    /// List all entries, newest first.
    List,
    /// Delete an entry by id.
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Clear the whole jar.
    Reset,
    /// Export the snapshot as CSV.
    Export {
        /// Output path; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render the settled jar to a PNG.
    Render {
        #[arg(long)]
        out: PathBuf,
    },
    /// Replay the most recent entry's drop as a PNG frame sequence.
    Frames {
        #[arg(long)]
        out_dir: PathBuf,
        /// Milliseconds between frames.
        #[arg(long, default_value_t = 16.0)]
        interval_ms: f64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mask = match &cli.mask {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read mask bitmap '{}'", path.display()))?;
            Some(MaskField::decode(&bytes)?)
        }
        None => None,
    };

    let store = Store::new(&cli.store);
    let mut app = JarApp::open(store, mask, cli.width, cli.height, cli.dpr)?;
    let now = now_ms()?;

    match cli.cmd {
        Command::Add { category, text } => cmd_add(&mut app, category, text, now),
        Command::List => cmd_list(&app),
        Command::Delete { id } => {
            app.handle(JarEvent::Delete { id }, now)?;
            Ok(())
        }
        Command::Reset => {
            app.handle(JarEvent::Reset, now)?;
            Ok(())
        }
        Command::Export { out } => cmd_export(&app, out),
        Command::Render { out } => cmd_render(&mut app, out, now),
        Command::Frames { out_dir, interval_ms } => cmd_frames(&mut app, out_dir, interval_ms, now),
    }
}

fn cmd_add(app: &mut JarApp, category: String, text: String, now: f64) -> anyhow::Result<()> {
    if coinjar::category_by_name(&category).is_none() {
        anyhow::bail!(
            "unknown category '{category}'; expected one of: {}",
            category_name_list().join(", ")
        );
    }
    let notes = app.handle(JarEvent::Add { category, text }, now)?;
    for note in notes {
        match note {
            Notification::CoinPlaced { id } => println!("placed {id}"),
            Notification::PlacementDegraded { id } => {
                eprintln!("warning: {id} used the fallback position (jar is crowded)");
            }
            Notification::Clink { .. } => {}
        }
    }
    Ok(())
}

fn cmd_list(app: &JarApp) -> anyhow::Result<()> {
    let mut entries = app.snapshot();
    entries.sort_by_key(|e| std::cmp::Reverse(e.created_ms));
    if entries.is_empty() {
        println!("no coins in the jar yet");
        return Ok(());
    }
    for e in entries {
        println!(
            "{}  [{}]  {}  ({})",
            e.id,
            e.category,
            e.text,
            coinjar::store::iso8601_utc(e.created_ms)
        );
    }
    Ok(())
}

fn cmd_export(app: &JarApp, out: Option<PathBuf>) -> anyhow::Result<()> {
    let csv = app.export_csv();
    match out {
        Some(path) => std::fs::write(&path, csv)
            .with_context(|| format!("write csv '{}'", path.display()))?,
        None => println!("{csv}"),
    }
    Ok(())
}

fn cmd_render(app: &mut JarApp, out: PathBuf, now: f64) -> anyhow::Result<()> {
    let frame = app.render_frame(now)?;
    write_png(&frame, &out)?;
    println!("wrote {}", out.display());
    Ok(())
}

fn cmd_frames(
    app: &mut JarApp,
    out_dir: PathBuf,
    interval_ms: f64,
    now: f64,
) -> anyhow::Result<()> {
    if interval_ms <= 0.0 {
        anyhow::bail!("interval-ms must be > 0");
    }
    let last = app
        .snapshot()
        .into_iter()
        .max_by_key(|e| e.created_ms)
        .context("jar is empty, nothing to replay")?;
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output directory '{}'", out_dir.display()))?;

    let duration = app.replay_drop(&last.id, now)?;
    let total = duration + SPARKLE_WINDOW_MS;
    let mut t = now;
    let mut index = 0u32;
    while t <= now + total {
        let out = app.tick(t)?;
        if let Some(frame) = out.frame {
            write_png(&frame, &out_dir.join(format!("frame_{index:04}.png")))?;
            index += 1;
        }
        t += interval_ms;
    }
    // One extra tick flushes the settled coin into the static layer.
    if let Some(frame) = app.tick(t)?.frame {
        write_png(&frame, &out_dir.join(format!("frame_{index:04}.png")))?;
        index += 1;
    }
    println!("wrote {index} frames to {}", out_dir.display());
    Ok(())
}

fn write_png(frame: &coinjar::FrameRGBA, path: &std::path::Path) -> anyhow::Result<()> {
    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.to_straight_rgba8())
        .context("frame buffer does not match its dimensions")?;
    img.save(path)
        .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}

fn now_ms() -> anyhow::Result<f64> {
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?;
    Ok(dur.as_millis() as f64)
}
