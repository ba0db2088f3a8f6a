use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    process::exit,
};

use clap::{Parser, ValueEnum};
use kou::{
    desugar, is_bytecode, lexer, parser,
    type_checker::{self, TypeContext},
    util::tree::ModuleTree,
    Options,
};

#[derive(Parser)]
#[command(name = "kouc", version, about = "Compiles kou programs to WebAssembly")]
struct Cli {
    /// Source file, or an already compiled module.
    source: PathBuf,

    /// Function to export.
    #[arg(long, default_value = "main")]
    main: String,

    /// Linear memory size in MiB.
    #[arg(short, long, default_value_t = 128)]
    memory: u32,

    /// Output path. Defaults to the source path with a `.wasm` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Emit::Wasm)]
    emit: Emit,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
enum Emit {
    Wasm,
    Tokens,
    Ast,
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(&cli) {
        eprintln!("{}: {error}", cli.source.display());
        exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let input = fs::read(&cli.source)?;

    if is_bytecode(&input) {
        if cli.emit != Emit::Wasm {
            return Err("input is already a compiled module".into());
        }
        fs::write(output_path(cli), &input)?;
        return Ok(());
    }

    let src = String::from_utf8(input)?;
    match cli.emit {
        Emit::Wasm => {
            let options = Options {
                exports: vec![cli.main.clone()],
                memory_size: cli.memory,
            };
            let bytes = kou::compile(&src, &options)?;
            fs::write(output_path(cli), bytes)?;
        }
        Emit::Tokens => {
            for token in lexer::tokenize(&src)? {
                println!("{token:?}");
            }
        }
        Emit::Ast => {
            let tokens = lexer::tokenize(&src)?;
            let module = desugar::desugar_before(parser::parse(&tokens)?);
            let module = type_checker::type_check(module, &mut TypeContext::new())?;
            print!("{}", ModuleTree(&module));
        }
    }
    Ok(())
}

fn output_path(cli: &Cli) -> PathBuf {
    match &cli.output {
        Some(path) => path.clone(),
        None => with_wasm_extension(&cli.source),
    }
}

fn with_wasm_extension(source: &Path) -> PathBuf {
    if source.extension().is_some_and(|ext| ext == "wasm") {
        source.with_extension("out.wasm")
    } else {
        source.with_extension("wasm")
    }
}
