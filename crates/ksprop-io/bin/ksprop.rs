//! `ksprop` command-line tool.
//!
//! Inspects, verifies and converts propagator files, and writes synthetic
//! propagators through an in-process cluster of ranks.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use ksprop_formats::{Color, ColorVector, Complex, ExpectedShape, LatticeShape, info_path};
use ksprop_io::codec::BinaryCodec;
use ksprop_io::{
    ChecksumReport, Communicator, FormatKind, HypercubeLayout, IoConfig, LocalCluster, PropFile,
    RoundRobinLayout, SingleRank, SiteMap, SliceLayout, TimesliceFormat,
    Verdict, WriteOrder, write_timeslices, zeroed_field,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "ksprop",
    about = "Inspect, verify and convert staggered quark propagator files",
    version
)]
struct Cli {
    /// JSON file with I/O settings
    #[arg(short, long, global = true, env = "KSPROP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header and stored checksums of a file
    Inspect {
        /// Propagator file
        file: PathBuf,
    },

    /// Read every color and compare checksums
    Verify {
        /// Propagator file
        file: PathBuf,

        /// Fail on the first checksum mismatch
        #[arg(long)]
        strict: bool,
    },

    /// Rewrite a file in another format
    Convert {
        /// Source file (format detected)
        input: PathBuf,

        /// Destination file
        output: PathBuf,

        /// Destination format
        #[arg(short = 't', long = "to", value_enum)]
        to: FormatArg,

        /// Byte order of binary output
        #[arg(long, value_enum)]
        byte_order: Option<OrderArg>,
    },

    /// Write a deterministic synthetic propagator
    Synth {
        /// Destination file, or base name for timeslice files
        output: PathBuf,

        /// Lattice extents nx ny nz nt
        #[arg(long, num_args = 4, value_names = ["NX", "NY", "NZ", "NT"], default_values_t = vec![4, 4, 4, 4])]
        dims: Vec<usize>,

        /// Number of ranks in the in-process cluster
        #[arg(short, long, default_value_t = 1)]
        ranks: usize,

        /// How sites are distributed over ranks
        #[arg(long, value_enum, default_value = "slice")]
        layout: LayoutArg,

        /// Output format
        #[arg(short, long, value_enum, default_value = "binary")]
        format: FormatArg,

        /// Write one file per timeslice instead
        #[arg(long, value_enum)]
        timeslices: Option<SliceArg>,

        /// Byte order of binary output
        #[arg(long, value_enum)]
        byte_order: Option<OrderArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Binary,
    Ascii,
    LegacyAscii,
}

impl From<FormatArg> for FormatKind {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Binary => Self::Binary,
            FormatArg::Ascii => Self::Ascii,
            FormatArg::LegacyAscii => Self::LegacyAscii,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SliceArg {
    Binary,
    Ascii,
}

impl From<SliceArg> for TimesliceFormat {
    fn from(arg: SliceArg) -> Self {
        match arg {
            SliceArg::Binary => Self::Binary,
            SliceArg::Ascii => Self::Ascii,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderArg {
    Native,
    Little,
    Big,
}

impl From<OrderArg> for WriteOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Native => Self::Native,
            OrderArg::Little => Self::Little,
            OrderArg::Big => Self::Big,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Slice,
    RoundRobin,
    Hypercube,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => IoConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => IoConfig::default(),
    };

    match cli.command {
        Commands::Inspect { file } => inspect(&file),
        Commands::Verify { file, strict } => verify(&file, IoConfig {
            strict_checksums: strict || config.strict_checksums,
            ..config
        }),
        Commands::Convert {
            input,
            output,
            to,
            byte_order,
        } => convert(&input, &output, to.into(), with_order(config, byte_order)),
        Commands::Synth {
            output,
            dims,
            ranks,
            layout,
            format,
            timeslices,
            byte_order,
        } => synth(&SynthArgs {
            output,
            dims,
            ranks,
            layout,
            format: format.into(),
            timeslices: timeslices.map(Into::into),
            config: with_order(config, byte_order),
        }),
    }
}

fn with_order(config: IoConfig, order: Option<OrderArg>) -> IoConfig {
    match order {
        Some(order) => IoConfig {
            write_byte_order: order.into(),
            ..config
        },
        None => config,
    }
}

fn inspect(path: &Path) -> Result<()> {
    let format = FormatKind::detect(path)?;
    let codec = ksprop_io::open_codec(path, Some(format), 1)?;
    let header = codec.header();

    println!("File:         {}", path.display());
    println!("Format:       {format}");
    println!("Byte order:   {}", codec.byte_order());
    println!("Magic:        {}", header.magic_number);
    println!("Lattice:      {}", codec.shape());
    println!("Time stamp:   {}", header.time_stamp.as_str());
    drop(codec);

    if format == FormatKind::Binary {
        let mut binary = BinaryCodec::open(path, 1)?;
        println!("File size:    {} bytes", binary.layout().file_bytes());
        for color in Color::ALL {
            let trailer = binary.read_trailer(color)?;
            println!(
                "Color {}:      offset {} trailer color {} checksums {}",
                color,
                binary.layout().color_offset(color),
                trailer.color,
                trailer.checksums()
            );
        }
    }

    let info = info_path(path);
    if info.exists() {
        println!("Info file:    {}", info.display());
    }
    Ok(())
}

fn verify(path: &Path, config: IoConfig) -> Result<()> {
    let mut file = PropFile::open(&SingleRank, path, ExpectedShape::Discover, None, config)?;
    let shape = file.shape();
    let map = SliceLayout::new(shape, 1);

    let mut fields: Vec<Vec<ColorVector<f32>>> =
        (0..3).map(|_| zeroed_field(shape.volume())).collect();
    let [a, b, c] = &mut fields[..] else {
        bail!("expected three color fields");
    };
    let reports = file.read_propagator(&map, [a, b, c])?;
    file.close()?;

    if reports.is_empty() {
        println!("{}: {} file carries no checksums", path.display(), shape);
        return Ok(());
    }
    let mut failed = 0;
    for report in &reports {
        print_report(report);
        if report.verdict == Verdict::Mismatch {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} color block(s) failed checksum verification");
    }
    Ok(())
}

fn print_report(report: &ChecksumReport) {
    let stored = report
        .stored
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    println!(
        "color {}: computed {} stored {} {:?}",
        report.color, report.computed, stored, report.verdict
    );
}

fn convert(input: &Path, output: &Path, to: FormatKind, config: IoConfig) -> Result<()> {
    let mut source = PropFile::open(
        &SingleRank,
        input,
        ExpectedShape::Discover,
        None,
        config.clone(),
    )?;
    let shape = source.shape();
    let map = SliceLayout::new(shape, 1);
    let mut fields: Vec<Vec<ColorVector<f32>>> =
        (0..3).map(|_| zeroed_field(shape.volume())).collect();
    let [a, b, c] = &mut fields[..] else {
        bail!("expected three color fields");
    };
    source.read_propagator(&map, [a, b, c])?;
    let from = source.format();
    source.close()?;

    let mut target = PropFile::create(&SingleRank, output, shape, to, config)?;
    target.write_propagator(&map, [&fields[0], &fields[1], &fields[2]])?;
    target.close()?;

    info!(
        "Converted {} ({}) to {} ({})",
        input.display(),
        from,
        output.display(),
        to
    );
    Ok(())
}

struct SynthArgs {
    output: PathBuf,
    dims: Vec<usize>,
    ranks: usize,
    layout: LayoutArg,
    format: FormatKind,
    timeslices: Option<TimesliceFormat>,
    config: IoConfig,
}

/// Value of component `k` at natural-order site `site` for `color`
fn synthetic_vector(site: usize, color: Color) -> ColorVector<f64> {
    let base = site as f64 + f64::from(color.index()) / 4.0;
    ColorVector::new(std::array::from_fn(|k| {
        let k = k as f64;
        Complex::new(base + k / 8.0, -base / 16.0 - k)
    }))
}

/// The part of a synthetic color field held by `rank`
fn local_field(
    shape: LatticeShape,
    map: &dyn SiteMap,
    rank: usize,
    color: Color,
) -> Vec<ColorVector<f64>> {
    let mut field = zeroed_field(map.sites_on(rank));
    for site in 0..shape.volume() {
        let coord = shape.coord(site);
        if map.owner_of(coord) == rank {
            if let Some(slot) = field.get_mut(map.local_slot(coord)) {
                *slot = synthetic_vector(site, color);
            }
        }
    }
    field
}

fn synth(args: &SynthArgs) -> Result<()> {
    let dims: [usize; 4] = args
        .dims
        .as_slice()
        .try_into()
        .context("--dims takes four extents")?;
    let shape = LatticeShape::new(dims)?;
    let map: Box<dyn SiteMap> = match args.layout {
        LayoutArg::Slice => Box::new(SliceLayout::new(shape, args.ranks)),
        LayoutArg::RoundRobin => Box::new(RoundRobinLayout::new(shape, args.ranks)),
        LayoutArg::Hypercube => Box::new(HypercubeLayout::new(shape, args.ranks)?),
    };
    let cluster = LocalCluster::new(args.ranks);
    info!(
        "Writing synthetic {} propagator from {} ranks to {}",
        shape,
        cluster.size(),
        args.output.display()
    );

    let results = cluster.run(|comm| -> ksprop_io::Result<()> {
        let fields: Vec<_> = Color::ALL
            .into_iter()
            .map(|color| local_field(shape, map.as_ref(), comm.rank(), color))
            .collect();
        let fields = [&fields[0], &fields[1], &fields[2]];

        if let Some(format) = args.timeslices {
            write_timeslices(
                &comm,
                &args.output,
                shape,
                map.as_ref(),
                fields,
                format,
                &args.config,
            )?;
            return Ok(());
        }

        let mut file = PropFile::create(
            &comm,
            &args.output,
            shape,
            args.format,
            args.config.clone(),
        )?;
        file.write_propagator(map.as_ref(), fields)?;
        file.close()
    });

    for (rank, result) in results.into_iter().enumerate() {
        result.with_context(|| format!("rank {rank} failed"))?;
    }
    Ok(())
}
