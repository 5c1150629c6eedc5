use clap::Parser;
use shader_converter::{ConvertOptions, batch::convert_folder};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// The folder containing legacy GLSL shader pairs like "sprite.vsh" and "sprite.psh".
    #[arg(short = 'i', long = "ifolder")]
    input_folder: String,

    /// The folder for the converted shaders.
    /// The folder structure of the input folder is preserved.
    #[arg(short = 'o', long = "ofolder")]
    output_folder: String,

    /// The maximum combined uniform size in bytes for both stages to use push constants.
    #[arg(long, default_value_t = 128)]
    push_constant_limit: u32,

    /// The log level for diagnostics like unused declarations.
    #[arg(long, default_value_t = log::LevelFilter::Warn)]
    log_level: log::LevelFilter,

    /// The extension for vertex shader input files.
    #[arg(long, default_value = "vsh")]
    vertex_ext: String,

    /// The extension for fragment shader input files.
    #[arg(long, default_value = "psh")]
    fragment_ext: String,

    /// The extension for converted vertex shader files.
    #[arg(long, default_value = "vert")]
    vertex_out_ext: String,

    /// The extension for converted fragment shader files.
    #[arg(long, default_value = "frag")]
    fragment_out_ext: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    simple_logger::SimpleLogger::new()
        .with_level(cli.log_level)
        .init()?;

    let options = ConvertOptions {
        push_constant_limit: cli.push_constant_limit,
        vertex_input_extension: cli.vertex_ext,
        fragment_input_extension: cli.fragment_ext,
        vertex_output_extension: cli.vertex_out_ext,
        fragment_output_extension: cli.fragment_out_ext,
        ..Default::default()
    };

    let start = std::time::Instant::now();
    let summary = convert_folder(&cli.input_folder, &cli.output_folder, &options)?;

    println!(
        "Converted {} shader pairs with {} failures in {:?}",
        summary.converted,
        summary.failed.len(),
        start.elapsed()
    );

    if !summary.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
