use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use foundation::Bounds;
use layers::{
    ChangeFlags, CullRect, DeviceLimits, GridCell, GridLayer, GridLayerProps, LabelColorEntry,
    LabelLayer, LabelLayerProps, Layer, OrthographicViewport, PickingInfo, RefreshOutcome,
    RenderCommand, RenderContext, TileOutcome, Viewport, tooltip,
};
use serde::Serialize;
use streaming::{InMemorySource, Selection};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "plateview",
    about = "Drive the plate and label layers against synthetic pyramids"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Settle a plate grid and print its render commands.
    Render(RenderArgs),
    /// Print the tooltip for a world coordinate over a plate grid.
    Pick(PickArgs),
    /// Load a label image and print its lookup texture and tiles.
    Labels(LabelArgs),
}

#[derive(Args, Debug)]
struct PlateArgs {
    #[arg(long, default_value_t = 2)]
    rows: u32,
    #[arg(long, default_value_t = 3)]
    columns: u32,
    /// Cell edge length at full resolution.
    #[arg(long, default_value_t = 256)]
    size: u32,
    /// Pyramid levels per cell.
    #[arg(long, default_value_t = 3)]
    levels: usize,
    #[arg(long, default_value_t = 5.0)]
    spacer: f64,
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// Camera centre `x,y`; fits the image when omitted.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    target: Option<[f64; 2]>,
    #[arg(long, allow_hyphen_values = true)]
    zoom: Option<f64>,
    #[arg(long, default_value_t = 800.0)]
    width: f64,
    #[arg(long, default_value_t = 600.0)]
    height: f64,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    plate: PlateArgs,
    #[command(flatten)]
    view: ViewArgs,
    /// Emit well names as a text command.
    #[arg(long)]
    text: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PickArgs {
    #[command(flatten)]
    plate: PlateArgs,
    /// World coordinate `x,y`.
    #[arg(value_parser = parse_point, allow_hyphen_values = true)]
    at: [f64; 2],
}

#[derive(Args, Debug)]
struct LabelArgs {
    #[arg(long, default_value_t = 1024)]
    image_width: u32,
    #[arg(long, default_value_t = 768)]
    image_height: u32,
    #[arg(long, default_value_t = 256)]
    tile_size: u32,
    #[arg(long, default_value_t = 3)]
    levels: usize,
    /// OME-NGFF `image-label.colors` list as JSON.
    #[arg(long, value_name = "FILE")]
    colors: Option<PathBuf>,
    #[arg(long, default_value_t = 8192)]
    max_texture: u32,
    #[command(flatten)]
    view: ViewArgs,
    /// Also pick at `x,y` and print the tooltip.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    pick: Option<[f64; 2]>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main(cli: Cli) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    match cli.command {
        Command::Render(args) => runtime.block_on(cmd_render(args)),
        Command::Pick(args) => runtime.block_on(cmd_pick(args)),
        Command::Labels(args) => runtime.block_on(cmd_labels(args)),
    }
}

fn parse_point(s: &str) -> Result<[f64; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x {x:?}: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y {y:?}: {e}"))?;
    Ok([x, y])
}

fn row_label(row: u32) -> String {
    match u8::try_from(row).ok().filter(|r| *r < 26) {
        Some(r) => char::from(b'A' + r).to_string(),
        None => format!("R{}", row + 1),
    }
}

fn well_name(row: u32, col: u32) -> String {
    format!("{}{}", row_label(row), col + 1)
}

/// Plate whose wells are filled with a per-well constant in two channels.
fn synthetic_plate(args: &PlateArgs) -> Vec<GridCell> {
    let n = args.size as usize * args.size as usize;
    let mut cells = Vec::with_capacity((args.rows * args.columns) as usize);
    for row in 0..args.rows {
        for col in 0..args.columns {
            let fill = (row * args.columns + col) as u16;
            let source = InMemorySource::builder(["c", "y", "x"], args.size, args.size)
                .plane(Selection::new([0]), vec![fill; n])
                .plane(Selection::new([1]), vec![fill.saturating_mul(2); n])
                .build();
            cells.push(GridCell::new(
                row,
                col,
                well_name(row, col),
                source.into_pyramid(args.levels),
            ));
        }
    }
    cells
}

fn plate_props(args: &PlateArgs) -> GridLayerProps {
    let mut props = GridLayerProps::new("plate", synthetic_plate(args), args.rows, args.columns);
    props.selections = Arc::from(vec![Selection::new([0]), Selection::new([1])]);
    props.row_labels = Some((0..args.rows).map(row_label).collect());
    props.config.spacer = args.spacer;
    props.pickable = true;
    props
}

fn viewport_for(view: &ViewArgs, image: [f64; 2]) -> OrthographicViewport {
    let base = OrthographicViewport::new([0.0, 0.0], 0.0, view.width, view.height);
    let fitted = layers::navigation::fit_image_to_viewport(
        streaming::Dimensions::new(image[0].ceil() as u32, image[1].ceil() as u32),
        &base,
        layers::navigation::fit_padding(view.width),
        None,
    )
    .unwrap_or(base);
    OrthographicViewport::new(
        view.target.unwrap_or(fitted.target),
        view.zoom.unwrap_or(fitted.zoom),
        view.width,
        view.height,
    )
}

#[derive(Serialize)]
struct CommandSummary {
    kind: &'static str,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<[f64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

fn bounds_array(b: &Bounds) -> [f64; 4] {
    [b.left, b.top, b.right, b.bottom]
}

fn summarize(command: &RenderCommand) -> CommandSummary {
    match command {
        RenderCommand::Bitmap(c) => CommandSummary {
            kind: "bitmap",
            id: c.id.clone(),
            bounds: Some(bounds_array(&c.bounds)),
            size: Some([c.width, c.height]),
            count: Some(c.channels.len()),
        },
        RenderCommand::Polygon(c) => CommandSummary {
            kind: "polygon",
            id: c.id.clone(),
            bounds: Bounds::from_points(c.polygon.iter().copied()).map(|b| bounds_array(&b)),
            size: None,
            count: Some(c.polygon.len()),
        },
        RenderCommand::Text(c) => CommandSummary {
            kind: "text",
            id: c.id.clone(),
            bounds: None,
            size: None,
            count: Some(c.labels.len()),
        },
        RenderCommand::LabelBitmap(c) => CommandSummary {
            kind: "labels",
            id: c.id.clone(),
            bounds: Some(bounds_array(&c.bounds)),
            size: Some([c.raster.width, c.raster.height]),
            count: None,
        },
    }
}

fn print_commands(commands: &[RenderCommand], json: bool) -> Result<(), String> {
    let summaries: Vec<CommandSummary> = commands.iter().map(summarize).collect();
    if json {
        let out = serde_json::to_string_pretty(&summaries)
            .map_err(|e| format!("failed to encode summary: {e}"))?;
        println!("{out}");
        return Ok(());
    }
    for s in &summaries {
        let bounds = s
            .bounds
            .map(|[l, t, r, b]| format!(" [{l:.1}, {t:.1}, {r:.1}, {b:.1}]"))
            .unwrap_or_default();
        let size = s
            .size
            .map(|[w, h]| format!(" {w}x{h}"))
            .unwrap_or_default();
        println!("{:<8} {}{bounds}{size}", s.kind, s.id);
    }
    Ok(())
}

fn outcome_label(outcome: &RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::Applied { tiles } => format!("applied {tiles} tiles"),
        RefreshOutcome::Cleared => "cleared".to_string(),
        RefreshOutcome::Discarded => "discarded".to_string(),
    }
}

async fn settled_grid(args: &PlateArgs, text: bool) -> Result<(GridLayer, [f64; 2]), String> {
    let mut props = plate_props(args);
    props.config.text = text;
    let mut layer = GridLayer::new(props).map_err(|e| format!("plate: {e}"))?;
    for outcome in layer
        .settle_all()
        .await
        .map_err(|e| format!("initial refresh: {e}"))?
    {
        info!(outcome = %outcome_label(&outcome), "initial refresh settled");
    }
    let full = layer.state().full;
    let image = layers::navigation::grid_image_size(full, args.rows, args.columns, args.spacer);
    Ok((layer, image))
}

async fn cmd_render(args: RenderArgs) -> Result<(), String> {
    let (mut layer, image) = settled_grid(&args.plate, args.text).await?;
    let viewport = viewport_for(&args.view, image);
    let props = layer.props().clone();
    layer
        .update(
            props,
            Some(&viewport as &dyn Viewport),
            ChangeFlags {
                viewport_changed: true,
            },
        )
        .map_err(|e| format!("update: {e}"))?;
    for outcome in layer
        .settle_all()
        .await
        .map_err(|e| format!("refresh: {e}"))?
    {
        info!(level = layer.level(), outcome = %outcome_label(&outcome), "refresh settled");
    }
    if !args.json {
        println!(
            "level {} at zoom {:.3}, {} tiles",
            layer.level(),
            viewport.zoom,
            layer.tiles().len()
        );
    }
    print_commands(&Layer::render(&layer, &RenderContext::default()), args.json)
}

async fn cmd_pick(args: PickArgs) -> Result<(), String> {
    let (layer, _) = settled_grid(&args.plate, false).await?;
    let info = layer.get_picking_info(PickingInfo::at(args.at));
    match tooltip(&info) {
        Some(text) => println!("{text}"),
        None => println!("(nothing)"),
    }
    Ok(())
}

fn read_colors(path: &PathBuf) -> Result<Vec<LabelColorEntry>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

fn outcome_tile(outcome: &TileOutcome) -> String {
    match outcome {
        TileOutcome::Loaded(i) => format!("loaded {}.{}.{}", i.x, i.y, i.z),
        TileOutcome::Failed(i) => format!("failed {}.{}.{}", i.x, i.y, i.z),
        TileOutcome::Discarded(i) => format!("discarded {}.{}.{}", i.x, i.y, i.z),
    }
}

async fn cmd_labels(args: LabelArgs) -> Result<(), String> {
    // horizontal runs of 64 pixels cycling through 32 labels
    let data: Vec<u32> = (0..args.image_width * args.image_height)
        .map(|i| (i / 64) % 32)
        .collect();
    let source = InMemorySource::builder(["y", "x"], args.image_width, args.image_height)
        .tile_size(args.tile_size)
        .plane(Selection::default(), data)
        .build();

    let mut props = LabelLayerProps::new(
        "segmentation",
        source.into_pyramid(args.levels),
        Selection::default(),
    );
    props.pickable = true;
    if let Some(path) = &args.colors {
        props.colors = Some(Arc::from(read_colors(path)?));
    }
    let limits = DeviceLimits {
        max_texture_dimension_2d: args.max_texture,
    };
    let mut layer = LabelLayer::new(props, limits).map_err(|e| format!("labels: {e}"))?;

    let texture = layer.color_texture();
    println!(
        "lookup texture {}x{}{}",
        texture.width,
        texture.height,
        if texture.fallback { " (default palette)" } else { "" }
    );

    let image = [f64::from(args.image_width), f64::from(args.image_height)];
    let viewport = viewport_for(&args.view, image);
    let requested = layer
        .load_visible(&viewport)
        .map_err(|e| format!("tiles: {e}"))?;
    info!(tiles = requested.len(), "label tiles requested");
    for outcome in layer
        .settle_all()
        .await
        .map_err(|e| format!("tiles: {e}"))?
    {
        println!("{}", outcome_tile(&outcome));
    }

    let ctx = RenderContext {
        viewport: Some(&viewport),
        cull_rect: Some(CullRect::new(0.0, 0.0, args.view.width, args.view.height)),
    };
    print_commands(&Layer::render(&layer, &ctx), false)?;

    if let Some(at) = args.pick {
        let info = layer.get_picking_info(PickingInfo::at(at));
        match tooltip(&info) {
            Some(text) => println!("{text}"),
            None => println!("(background)"),
        }
    }
    Ok(())
}
