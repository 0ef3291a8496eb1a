use std::env;
use std::path::PathBuf;
use std::process::exit;

#[allow(clippy::struct_excessive_bools)]
#[derive(Default)]
pub struct Args {
    #[cfg(feature = "resolve")]
    pub resolve: bool,

    #[cfg(feature = "layout")]
    pub layout: bool,

    #[cfg(feature = "emit")]
    pub emit: bool,

    #[cfg(feature = "link")]
    pub binary: bool,
    #[cfg(feature = "link")]
    pub eeprom: bool,
    #[cfg(feature = "link")]
    pub dat: bool,
    #[cfg(feature = "link")]
    pub no_dedup: bool,
    #[cfg(feature = "link")]
    pub memory_size: Option<usize>,

    #[cfg(feature = "export")]
    pub sob: bool,

    pub verbose: bool,
    pub output: Option<PathBuf>,
    pub input: PathBuf,
}

impl Args {
    pub fn parse() -> Self {
        let mut env_args = env::args().skip(1);
        let mut args = Self::default();
        let mut input_file = None;

        while let Some(arg) = env_args.next() {
            match arg.as_str() {
                #[cfg(feature = "resolve")]
                "--resolve" => args.resolve = true,
                #[cfg(feature = "layout")]
                "--layout" => args.layout = true,
                #[cfg(feature = "emit")]
                "--emit" => args.emit = true,
                #[cfg(feature = "link")]
                "-b" | "--binary" => args.binary = true,
                #[cfg(feature = "link")]
                "-e" | "--eeprom" => args.eeprom = true,
                #[cfg(feature = "link")]
                "--dat" => args.dat = true,
                #[cfg(feature = "link")]
                "--no-dedup" => args.no_dedup = true,
                #[cfg(feature = "link")]
                "-M" => {
                    let size = env_args.next().and_then(|s| s.parse().ok());
                    args.memory_size = Some(size.unwrap_or_else(|| Self::usage()));
                }
                #[cfg(feature = "export")]
                "--sob" => args.sob = true,
                "-o" => {
                    let output = env_args.next().unwrap_or_else(|| Self::usage());
                    args.output = Some(PathBuf::from(output));
                }
                "-v" | "--verbose" => args.verbose = true,
                "-h" | "--help" => Self::usage(),
                _ => {
                    if input_file.is_some() {
                        Self::usage();
                    }
                    let file = PathBuf::from(arg);
                    input_file = Some(file);
                }
            }
        }
        args.input = input_file.unwrap_or_else(|| Self::usage());
        args
    }

    /// Output path for extension `ext`: `-o` if given, else the input's stem.
    pub fn output_file(&self, ext: &str) -> PathBuf {
        let mut file = self.output.clone().unwrap_or_else(|| self.input.clone());
        file.set_extension(ext);
        file
    }

    fn usage() -> ! {
        let cmd0 = std::env::args().next().unwrap_or("nlsc".to_owned());
        let usage_msg = format!("Usage: {cmd0} [OPTIONS] FILE.json\n");
        let options = [
            "Options:\n",
            "  -h, --help             Show this message\n",
            "  -v, --verbose          Log every phase (RUST_LOG overrides)\n",
            "  -o <name>              Base name of the output files\n",
            #[cfg(feature = "resolve")]
            "      --resolve          Stop after registering objects\n",
            #[cfg(feature = "layout")]
            "      --layout           Stop after compiling objects, show their layout\n",
            #[cfg(feature = "emit")]
            "      --emit             Stop after compiling objects, show method bytes\n",
            #[cfg(feature = "link")]
            "  -b, --binary           Write a .binary image (program only)\n",
            #[cfg(feature = "link")]
            "  -e, --eeprom           Write a .eeprom image (default)\n",
            #[cfg(feature = "link")]
            "      --dat              Write the root object's DAT bytes to .dat\n",
            #[cfg(feature = "link")]
            "      --no-dedup         Keep structurally identical objects\n",
            #[cfg(feature = "link")]
            "  -M <bytes>             Hub memory size (default 32768)\n",
            #[cfg(feature = "export")]
            "      --sob              Write a .sob file for every object\n",
        ];

        print!("Nameless Spin compiler\n\n{usage_msg}\n");
        options.into_iter().for_each(|o| print!("{o}"));

        exit(0)
    }
}
