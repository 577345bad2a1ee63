use std::error::Error;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;

use oddmask::{export, MapData, Mask, MaskApplier, RoadGraph};

#[derive(Debug, thiserror::Error)]
enum LoadErrorKind {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}: {1}")]
struct LoadError(PathBuf, #[source] LoadErrorKind);

#[derive(Parser)]
#[command(about = "Prune a saved road graph against an ODD mask")]
struct Cli {
    /// Path to the saved graph (JSON, as written by MapData::to_json)
    graph_file: PathBuf,

    /// Path to the ODD mask (JSON)
    mask_file: PathBuf,

    /// Write the masked map as OSM XML (gzipped when the path ends in .gz)
    #[arg(short, long)]
    osm_output: Option<PathBuf>,

    /// Write the masked graph as GraphML
    #[arg(long)]
    graphml_output: Option<PathBuf>,

    /// Write the masked graph as GeoJSON (stdout when omitted)
    #[arg(short, long)]
    geojson_output: Option<PathBuf>,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    let data = load_map_data(&cli.graph_file)?;
    let mask = load_mask(&cli.mask_file)?;

    let mut applier = MaskApplier::new(data);
    applier.apply(&mask)?;
    let data = applier.into_data();

    if let Some(path) = &cli.osm_output {
        let file = File::create(path)?;
        if path.extension().is_some_and(|e| e == "gz") {
            export::map_data_to_osm_xml_gz(&data, file)?;
        } else {
            export::map_data_to_osm_xml(&data, file)?;
        }
    }

    let graph = RoadGraph::from_map_data(&data)?;
    log::info!(
        "masked graph: {} nodes, {} edges, strongly connected: {}",
        graph.len(),
        graph.edge_count(),
        graph.is_strongly_connected()
    );

    if let Some(path) = &cli.graphml_output {
        export::graph_to_graphml(&graph, File::create(path)?)?;
    }

    match &cli.geojson_output {
        Some(path) => export::graph_to_geojson(&graph, File::create(path)?)?,
        None => export::graph_to_geojson(&graph, io::stdout().lock())?,
    }

    Ok(())
}

fn load_map_data<P: AsRef<Path>>(path: P) -> Result<MapData, LoadError> {
    let wrap = |e: LoadErrorKind| LoadError(path.as_ref().to_path_buf(), e);
    let file = File::open(path.as_ref()).map_err(|e| wrap(e.into()))?;
    MapData::from_json(file).map_err(|e| wrap(e.into()))
}

fn load_mask<P: AsRef<Path>>(path: P) -> Result<Mask, LoadError> {
    let wrap = |e: LoadErrorKind| LoadError(path.as_ref().to_path_buf(), e);
    let file = File::open(path.as_ref()).map_err(|e| wrap(e.into()))?;
    Mask::from_json(file).map_err(|e| wrap(e.into()))
}
