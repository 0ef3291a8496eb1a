mod args;
mod driver_error;

use args::Args;
use driver_error::DriverError;
use nlsc::*;

use std::fs;

type BoxedError = Box<dyn std::error::Error>;

fn init_logging(args: &Args) {
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

fn read_program(args: &Args) -> Result<ast::Program, BoxedError> {
    let source = fs::read_to_string(&args.input).map_err(DriverError::from)?;
    let program = serde_json::from_str(&source).map_err(DriverError::from)?;
    Ok(program)
}

#[cfg(feature = "resolve")]
fn register(program: ast::Program, args: &Args) -> Result<resolve::GlobalTable, BoxedError> {
    let globals = resolve::GlobalTable::register(program).map_err(DriverError::from)?;
    if args.resolve {
        let order: Vec<&str> = globals.order().iter().map(|&id| globals.table(id).file.as_str()).collect();
        dbg!(&order);
    }
    Ok(globals)
}

#[cfg(feature = "link")]
#[allow(dead_code)]
#[derive(Debug)]
struct ObjectLayout<'a> {
    file: &'a str,
    hub_address: i32,
    methods: usize,
    objects: i32,
    dat_bytes: usize,
    var_size: i32,
    size_in_bytes: i32,
}

#[cfg(feature = "link")]
#[allow(dead_code)]
#[derive(Debug)]
struct MethodCode<'a> {
    method: String,
    index: i32,
    offset: i32,
    locals_size: i32,
    bytes: &'a [u8],
}

#[cfg(feature = "link")]
fn compile_objects(globals: &mut resolve::GlobalTable, config: &config::Config, args: &Args) -> Result<(), BoxedError> {
    link::build_objects(globals, config).map_err(DriverError::from)?;

    if args.layout {
        let layouts: Vec<ObjectLayout> = globals
            .order()
            .iter()
            .map(|&id| {
                let table = globals.table(id);
                ObjectLayout {
                    file: &table.file,
                    hub_address: table.hub_address,
                    methods: table.method_count(),
                    objects: table.n_objs,
                    dat_bytes: table.dat_bytes.len(),
                    var_size: table.var_size,
                    size_in_bytes: table.size_in_bytes,
                }
            })
            .collect();
        dbg!(&layouts);
    }
    if args.emit {
        let methods: Vec<MethodCode> = globals
            .order()
            .iter()
            .flat_map(|&id| {
                let table = globals.table(id);
                table.methods_in_table_order().map(|m| MethodCode {
                    method: format!("{}.{}", table.file, m.name.name),
                    index: m.index,
                    offset: m.offset,
                    locals_size: m.locals_size,
                    bytes: &m.bytes,
                })
            })
            .collect();
        dbg!(&methods);
    }
    Ok(())
}

#[cfg(feature = "link")]
fn link_image(globals: &mut resolve::GlobalTable, config: &config::Config, args: &Args) -> Result<(), BoxedError> {
    if config.eliminate_duplicates {
        link::eliminate_duplicates(globals);
    }
    let image = link::build_image(globals, config).map_err(DriverError::from)?;

    if args.binary {
        fs::write(args.output_file("binary"), image.binary()).map_err(DriverError::from)?;
    }
    if args.eeprom || !args.binary {
        fs::write(args.output_file("eeprom"), image.eeprom()).map_err(DriverError::from)?;
    }
    if args.dat {
        let root = globals.table(globals.root());
        fs::write(args.output_file("dat"), &root.dat_bytes).map_err(DriverError::from)?;
    }
    Ok(())
}

#[cfg(feature = "export")]
fn write_sobs(globals: &resolve::GlobalTable, args: &Args) -> Result<(), BoxedError> {
    let out = args.output_file("sob");
    let dir = out.parent().unwrap_or_else(|| std::path::Path::new(""));
    for &id in globals.order() {
        let bytes = export::write_sob(globals, id).map_err(DriverError::from)?;
        let file = dir.join(export::sob_file_name(&globals.table(id).file));
        log::info!("writing {}", file.display());
        fs::write(&file, bytes).map_err(DriverError::from)?;
    }
    Ok(())
}

#[allow(unused_variables, unused_mut)]
pub fn main() -> Result<(), BoxedError> {
    let args = Args::parse();
    init_logging(&args);

    let file_exists = fs::exists(&args.input)?;
    if !file_exists {
        let filename = args.input.to_string_lossy().to_string();
        let err = DriverError::InputFileDoesNotExist(filename);
        Err(err)?;
    }
    let program = read_program(&args)?;

    #[cfg(feature = "resolve")]
    let mut globals = register(program, &args)?;

    #[cfg(feature = "resolve")]
    if args.resolve {
        return Ok(());
    }

    #[cfg(feature = "link")]
    {
        let config = config::Config {
            memory_size: args.memory_size.unwrap_or(config::DEFAULT_MEMORY_SIZE),
            eliminate_duplicates: !args.no_dedup,
            ..Default::default()
        };
        compile_objects(&mut globals, &config, &args)?;
        if args.layout || args.emit {
            return Ok(());
        }
        link_image(&mut globals, &config, &args)?;
        log::info!("{} warnings", globals.warnings.len());
    }

    #[cfg(feature = "export")]
    if args.sob {
        write_sobs(&globals, &args)?;
    }

    Ok(())
}
