//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, LevelFilter};
use structopt::StructOpt;

use crate::mime::entity::Message;
use crate::mime::fetch::section::{
    BodySection, Partial, SectionExtractor, Specifier,
};
use crate::support::buffer::Literal;
use crate::support::error::{Error, ErrorKind};
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

/// Extract a single IMAP body section from a MIME message.
///
/// The section is written to standard output exactly as an IMAP server would
/// return it for `BODY[section]<partial>`. For example, `--part 2.1
/// --specifier TEXT --partial 0.100` is equivalent to
/// `BODY[2.1.TEXT]<0.100>`.
///
/// Exits with EX_DATAERR if the message has no such part, or EX_IOERR if the
/// message could not be read.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// Read limits and buffer settings from this TOML file.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Configure logging from this log4rs TOML file instead of writing
    /// warnings to standard error.
    #[structopt(long, parse(from_os_str))]
    log_config: Option<PathBuf>,

    /// Log debug information to standard error.
    #[structopt(short, long)]
    verbose: bool,

    /// Dot-separated part numbers, e.g. "2.1". The whole message is used if
    /// not given.
    #[structopt(short, long)]
    part: Option<SectionPath>,

    /// One of HEADER, HEADER.FIELDS, HEADER.FIELDS.NOT, MIME, or TEXT.
    /// Without it, the whole part is extracted.
    #[structopt(short, long)]
    specifier: Option<String>,

    /// A header field name for HEADER.FIELDS or HEADER.FIELDS.NOT. Can be
    /// passed multiple times.
    #[structopt(short, long, number_of_values(1))]
    field: Vec<String>,

    /// Only return this byte range of the section, given as OFFSET.LENGTH.
    #[structopt(long)]
    partial: Option<Partial>,

    /// The message file. "-" will read from stdin.
    #[structopt(parse(from_os_str), default_value = "-")]
    message: PathBuf,
}

/// The part numbers of a section, e.g. `2.1`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct SectionPath(Vec<u32>);

impl FromStr for SectionPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Ok(SectionPath::default());
        }

        s.split('.')
            .map(|n| match n.parse::<u32>() {
                Ok(0) | Err(_) => Err(format!("Bad part number '{}'", n)),
                Ok(n) => Ok(n),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SectionPath)
    }
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let matches = Options::clap().get_matches_safe();
    let options = Options::from_clap(&match matches {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    init_logging(options.log_config.as_deref(), options.verbose);

    let system_config = match options.config {
        Some(ref path) => load_config(path),
        None => SystemConfig::default(),
    };

    let section = match build_section(
        options.part.unwrap_or_default(),
        options.specifier.as_deref(),
        options.field,
        options.partial,
    ) {
        Ok(section) => section,
        Err(e) => {
            eprintln!("{}", e);
            EX_USAGE.exit()
        }
    };
    debug!("Extracting {}", section);

    let message = match read_message(&options.message, &system_config) {
        Ok(message) => message,
        Err(e) => {
            eprintln!("Error reading '{}': {}", options.message.display(), e);
            EX_NOINPUT.exit()
        }
    };

    let mut literal = match extract(&message, &system_config, &section) {
        Ok(literal) => literal,
        Err(e) => {
            eprintln!("{}: {}", section, e);
            exit_code(&e).exit()
        }
    };

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    if let Err(e) = io::copy(&mut literal, &mut stdout) {
        eprintln!("Error writing output: {}", e);
        EX_IOERR.exit();
    }
}

fn build_section(
    path: SectionPath,
    specifier: Option<&str>,
    fields: Vec<String>,
    partial: Option<Partial>,
) -> Result<BodySection, String> {
    let name = specifier.unwrap_or("");
    let specifier = Specifier::from_name(name, fields.clone())
        .ok_or_else(|| format!("Unknown specifier '{}'", name))?;

    match specifier {
        Specifier::HeaderFields(ref f) | Specifier::HeaderFieldsNot(ref f)
            if f.is_empty() =>
        {
            return Err(format!("{} needs at least one --field", name));
        }
        Specifier::HeaderFields(..) | Specifier::HeaderFieldsNot(..) => (),
        _ if !fields.is_empty() => {
            return Err(
                "--field is only meaningful with HEADER.FIELDS or \
                 HEADER.FIELDS.NOT"
                    .to_owned(),
            );
        }
        _ => (),
    }

    Ok(BodySection {
        path: path.0,
        specifier,
        partial,
    })
}

fn load_config(path: &Path) -> SystemConfig {
    let mut system_config_toml = Vec::new();
    if let Err(e) = fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut system_config_toml))
    {
        eprintln!("Error reading '{}': {}", path.display(), e);
        EX_CONFIG.exit();
    }

    match SystemConfig::from_toml(&system_config_toml) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error in config file at '{}': {}", path.display(), e);
            EX_CONFIG.exit()
        }
    }
}

fn read_message(
    path: &Path,
    system_config: &SystemConfig,
) -> Result<Message, Error> {
    if Path::new("-") == path {
        let stdin = io::stdin();
        let stdin = stdin.lock();
        Message::read_from(stdin, system_config.limits)
    } else {
        Message::read_from(fs::File::open(path)?, system_config.limits)
    }
}

fn extract(
    message: &Message,
    system_config: &SystemConfig,
    section: &BodySection,
) -> Result<Literal, Error> {
    let root = message.root()?;
    SectionExtractor::new(system_config.buffer.clone()).extract(&root, section)
}

fn exit_code(error: &Error) -> Sysexit {
    match (error.kind(), error) {
        (ErrorKind::NoSuchPart, _) => EX_DATAERR,
        (ErrorKind::Unreadable, Error::Io(..)) => EX_IOERR,
        (ErrorKind::Unreadable, _) => EX_DATAERR,
    }
}

fn init_logging(log_config: Option<&Path>, verbose: bool) {
    if let Some(log_config) = log_config {
        if let Err(e) =
            log4rs::init_file(log_config, log4rs::file::Deserializers::new())
        {
            eprintln!(
                "Error in logging config at '{}': {}",
                log_config.display(),
                e
            );
            EX_CONFIG.exit();
        }
    } else {
        init_simple_log(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        });
    }
}

fn init_simple_log(level: LevelFilter) {
    use log4rs::append::console::{ConsoleAppender, Target};
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level));

    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("Failed to initialise logging: {}", e);
                EX_SOFTWARE.exit();
            }
        }
        Err(e) => {
            eprintln!("Failed to initialise logging: {}", e);
            EX_SOFTWARE.exit();
        }
    }
}
