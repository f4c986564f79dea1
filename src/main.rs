use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{error::ErrorKind, ArgAction, ArgGroup, CommandFactory, Parser};
use log::{error, info};

use datpack::{
    codec::palette::Palette,
    datafile::{load, save, SaveOptions, Session},
    depend,
    error::Error,
    grab::{self, GrabParams},
    header,
    object::{Archive, Body, DataObject},
    select::Selector,
    tag::Tag,
    update,
};

/// Creates and edits Allegro datafiles.
#[derive(Parser, Debug)]
#[command(name = "dat", version, about, long_about = None, disable_help_flag = true)]
#[command(group(ArgGroup::new("command").args(["add", "delete", "extract", "list", "update", "force_update"])))]
struct Cli {
    /// Add the named files
    #[arg(short = 'a')]
    add: bool,

    /// Delete the named objects
    #[arg(short = 'd')]
    delete: bool,

    /// Extract the named objects
    #[arg(short = 'e', short_alias = 'x')]
    extract: bool,

    /// List the contents of the datafile
    #[arg(short = 'l')]
    list: bool,

    /// Update objects whose source files have changed
    #[arg(short = 'u')]
    update: bool,

    /// Update every object regardless of timestamps
    #[arg(short = 'w')]
    force_update: bool,

    /// 0: no compression, 1: per object, 2: whole file
    #[arg(short = 'c', value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=2))]
    compression: Option<u8>,

    /// 0: keep everything, 1: strip grabber info, 2: strip all properties.
    /// `-s-PROP` keeps PROP regardless of the level.
    #[arg(short = 's', value_name = "LEVEL|-PROP", allow_hyphen_values = true)]
    strip: Vec<String>,

    /// 0: keep insertion order, 1: sort objects by name
    #[arg(short = 'n', value_name = "SORT", value_parser = clap::value_parser!(u8).range(0..=1))]
    sort: Option<u8>,

    /// Colour depth for grabbed bitmaps
    #[arg(long = "bpp", value_name = "DEPTH", value_parser = parse_depth)]
    color_depth: Option<i32>,

    /// Grab a region of the source image
    #[arg(short = 'g', num_args = 4, value_names = ["X", "Y", "W", "H"], allow_negative_numbers = true)]
    grid: Option<Vec<i32>>,

    /// Write object indexes to a C header
    #[arg(short = 'h', value_name = "FILE")]
    header: Option<PathBuf>,

    /// Write makefile dependencies
    #[arg(short = 'm', value_name = "FILE")]
    dependencies: Option<PathBuf>,

    /// Prefix for header definitions
    #[arg(short = 'p', value_name = "PREFIX")]
    prefix: Option<String>,

    /// Palette object to use for colour conversion
    #[arg(long = "pal", value_name = "NAME")]
    palette: Option<String>,

    /// Output file or directory for extraction
    #[arg(short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Object type for added files
    #[arg(short = 't', value_name = "TYPE")]
    object_type: Option<Tag>,

    /// Store origins relative to the datafile
    #[arg(short = 'f')]
    relative: bool,

    /// Keep file names as object names
    #[arg(short = 'k')]
    keep_names: bool,

    /// Add directories as nested datafiles
    #[arg(short = 'r')]
    recursive: bool,

    #[arg(short = 'v')]
    verbose: bool,

    /// Encryption password
    #[arg(long = "password", visible_alias = "007", value_name = "PASSWORD")]
    password: Option<String>,

    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    datafile: PathBuf,

    /// Object names, file names, or PROP=value assignments
    operands: Vec<String>,
}

fn parse_depth(arg: &str) -> Result<i32, String> {
    match arg.parse::<i32>() {
        Ok(depth @ (8 | 15 | 16 | 24 | 32)) => Ok(depth),
        _ => Err("colour depth must be 8, 15, 16, 24 or 32".to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Add,
    Delete,
    Extract,
    List,
    Update { force: bool },
}

enum Answer {
    Yes,
    No,
    Quit,
}

struct Dat {
    cli: Cli,
    command: Option<Command>,
    names: Vec<String>,
    props: Vec<String>,
    strip: Option<u8>,
    fixed_props: Vec<Tag>,
    session: Session,
    selector: Selector,
    changed: bool,
    overwrite_all: bool,
}

impl Dat {
    fn new(cli: Cli) -> Result<Self, clap::Error> {
        let command = if cli.add {
            Some(Command::Add)
        } else if cli.delete {
            Some(Command::Delete)
        } else if cli.extract {
            Some(Command::Extract)
        } else if cli.list {
            Some(Command::List)
        } else if cli.update || cli.force_update {
            Some(Command::Update {
                force: cli.force_update,
            })
        } else {
            None
        };

        let (props, names): (Vec<String>, Vec<String>) =
            cli.operands.iter().cloned().partition(|operand| operand.contains('='));

        let mut strip = None;
        let mut fixed_props = Vec::new();
        for arg in &cli.strip {
            if let Some(prop) = arg.strip_prefix('-') {
                fixed_props.push(Tag::clean(prop));
                continue;
            }
            match arg.as_str() {
                "0" | "1" | "2" if strip.is_none() => strip = arg.parse::<u8>().ok(),
                _ => return Err(usage(ErrorKind::InvalidValue, &format!("invalid strip option '{}'", arg))),
            }
        }

        let dat = Dat {
            session: Session::default().with_password(cli.password.clone()),
            selector: Selector::new(names.clone()),
            cli,
            command,
            names,
            props,
            strip,
            fixed_props,
            changed: false,
            overwrite_all: false,
        };
        dat.validate()?;
        Ok(dat)
    }

    fn validate(&self) -> Result<(), clap::Error> {
        if self.command.is_none()
            && self.cli.compression.is_none()
            && self.strip.is_none()
            && self.cli.sort.is_none()
            && self.props.is_empty()
            && self.cli.header.is_none()
            && self.cli.dependencies.is_none()
        {
            return Err(usage(ErrorKind::MissingRequiredArgument, "nothing to do"));
        }

        if self.names.is_empty() {
            let missing = match self.command {
                Some(Command::Add) => Some("No files specified for addition"),
                Some(Command::Delete) => Some("No objects specified for deletion"),
                Some(Command::Extract) => Some("No objects specified: use '*' to extract everything"),
                _ if !self.props.is_empty() => Some("No objects specified for setting properties"),
                _ => None,
            };
            if let Some(message) = missing {
                return Err(usage(ErrorKind::MissingRequiredArgument, message));
            }
        }

        if !self.fixed_props.is_empty() && self.strip.is_none() {
            return Err(usage(ErrorKind::MissingRequiredArgument, "no strip mode"));
        }

        if let Some(grid) = &self.cli.grid {
            if grid[0] < 0 || grid[1] < 0 || grid[2] <= 0 || grid[3] <= 0 {
                return Err(usage(ErrorKind::InvalidValue, "grab region must have a positive size"));
            }
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), Error> {
        let mut archive = load(&self.cli.datafile, &mut self.session)?;

        if let Some(name) = self.cli.palette.clone() {
            self.select_palette(&archive, &name)?;
        }

        match self.command {
            // A failed add or export ends the batch before anything is
            // saved, so the datafile on disk is left as it was.
            Some(Command::Add) => {
                for name in self.names.clone() {
                    let path = PathBuf::from(&name);
                    if !path.exists() || (path.is_dir() && !self.cli.recursive) {
                        return Err(Error::NotFound(name));
                    }
                    self.add_file(&mut archive, &path)?;
                }
            }
            Some(Command::Delete) => self.delete(&mut archive, ""),
            Some(Command::Extract) => self.extract(&archive, "")?,
            Some(Command::List) => self.list(&archive, ""),
            Some(Command::Update { force }) => {
                let datafile = self.cli.datafile.clone();
                self.changed |= update::update(
                    &mut archive,
                    &datafile,
                    force,
                    self.cli.verbose,
                    &mut self.selector,
                    &mut self.session,
                )?;
            }
            None => {}
        }

        if matches!(self.command, Some(command) if command != Command::Add) {
            self.check_unused()?;
        }

        if !self.props.is_empty() {
            self.selector = Selector::new(self.names.clone());
            self.set_properties(&mut archive, "");
            self.check_unused()?;
        }

        if self.changed || self.cli.compression.is_some() || self.strip.is_some() || self.cli.sort.is_some() {
            let options = SaveOptions {
                pack: self.cli.compression,
                strip: self.strip,
                sort: self.cli.sort.map(|sort| sort == 1),
                verbose: self.cli.verbose,
                backup: Some(false),
            };
            save(&mut archive, &self.cli.datafile, &options, &self.fixed_props, &mut self.session)?;
        }

        if let Some(header_path) = &self.cli.header {
            header::write(
                &archive,
                &self.cli.datafile,
                header_path,
                self.cli.prefix.as_deref(),
                &self.session,
            )?;
        }

        if let Some(depfile) = &self.cli.dependencies {
            depend::write(
                &archive,
                &self.cli.datafile,
                depfile,
                self.cli.header.as_deref(),
                self.cli.password.as_deref(),
            )?;
        }
        Ok(())
    }

    fn check_unused(&self) -> Result<(), Error> {
        let unused: Vec<&str> = self.selector.unused().collect();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(Error::NotFound(unused.join(", ")))
        }
    }

    fn select_palette(&mut self, archive: &Archive, name: &str) -> Result<(), Error> {
        let object = archive.find(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
        if object.tag != Tag::PALETTE {
            return Err(Error::NotAPalette(name.to_string()));
        }
        let data = object
            .bytes()
            .ok_or_else(|| Error::MalformedObject(Tag::PALETTE, format!("{} has no palette data", name)))?;
        self.session.palette = Palette::decode(data)?;
        info!("Using palette {}", name);
        Ok(())
    }

    fn object_name(&self, file_name: &str) -> String {
        if self.cli.keep_names {
            file_name.to_string()
        } else {
            file_name.to_ascii_uppercase().replace('.', "_")
        }
    }

    fn add_file(&mut self, archive: &mut Archive, path: &Path) -> Result<(), Error> {
        let Some(file_name) = path.file_name() else {
            return Ok(());
        };
        let name = self.object_name(&file_name.to_string_lossy());

        if path.is_dir() {
            return self.add_directory(archive, path, &name);
        }

        let (x, y, w, h) = match self.cli.grid.as_deref() {
            Some(&[x, y, w, h]) => (x, y, w, h),
            _ => (-1, -1, -1, -1),
        };
        let params = GrabParams {
            tag: self.cli.object_type,
            x,
            y,
            w,
            h,
            color_depth: self.cli.color_depth,
            relative: self.cli.relative,
            ..GrabParams::new(&self.cli.datafile, path, &name)
        };

        match archive.position(&name) {
            Some(index) => {
                info!("Replacing {} -> {}", path.display(), name);
                let object = &mut archive.objects[index];
                grab::grab_replace(object, &params, &mut self.session)?;
            }
            None => {
                info!("Inserting {} -> {}", path.display(), name);
                grab::grab_new(archive, &params, &mut self.session)?;
            }
        }
        self.changed = true;
        Ok(())
    }

    fn add_directory(&mut self, archive: &mut Archive, path: &Path, name: &str) -> Result<(), Error> {
        let existing = archive
            .iter()
            .position(|o| o.tag == Tag::FILE && o.name().eq_ignore_ascii_case(name));
        let index = match existing {
            Some(index) => index,
            None => {
                info!("Creating sub-datafile {}", name);
                archive.insert(name, Tag::FILE, Body::Archive(Archive::new()));
                archive.len() - 1
            }
        };

        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<PathBuf>, _>>()?;
        entries.sort();
        if entries.is_empty() {
            return Err(Error::NotFound(format!("objects to add in {}", path.display())));
        }

        let nested = archive
            .get_mut(index)
            .and_then(DataObject::archive_mut)
            .ok_or_else(|| Error::MalformedObject(Tag::FILE, format!("{} is not a nested datafile", name)))?;
        for entry in entries {
            self.add_file(nested, &entry)?;
        }
        self.changed = true;
        Ok(())
    }

    fn delete(&mut self, archive: &mut Archive, parent: &str) {
        let mut index = 0;
        while index < archive.len() {
            let path = format!("{}{}", parent, archive.objects[index].name());
            if self.selector.matches(&path) {
                info!("Deleting {}", path);
                archive.delete(index);
                self.changed = true;
                continue;
            }
            if let Some(nested) = archive.objects[index].archive_mut() {
                self.delete(nested, &format!("{}/", path));
            }
            index += 1;
        }
    }

    fn extract(&mut self, archive: &Archive, parent: &str) -> Result<(), Error> {
        for object in archive.iter() {
            let path = format!("{}{}", parent, object.name());
            if self.selector.matches(&path) {
                self.export(object)?;
            } else if let Some(nested) = object.archive() {
                self.extract(nested, &format!("{}/", path))?;
            }
        }
        Ok(())
    }

    fn export(&mut self, object: &DataObject) -> Result<(), Error> {
        let target = grab::export_name(object, self.cli.output.as_deref(), &self.session.registry);
        if target.exists() {
            match self.ask(&format!("{} already exists, overwrite", target.display()))? {
                Answer::Yes => {}
                Answer::No => return Ok(()),
                Answer::Quit => return Err(Error::Cancelled),
            }
        }
        grab::export(object, self.cli.output.as_deref(), &self.session)?;
        Ok(())
    }

    fn ask(&mut self, question: &str) -> Result<Answer, Error> {
        if self.overwrite_all {
            return Ok(Answer::Yes);
        }
        let stdin = io::stdin();
        loop {
            print!("{}? (y/n/a/q) ", question);
            io::stdout().flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                return Ok(Answer::Quit);
            }
            match line.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
                Some('y') => return Ok(Answer::Yes),
                Some('n') => return Ok(Answer::No),
                Some('a') => {
                    self.overwrite_all = true;
                    return Ok(Answer::Yes);
                }
                Some('q') => return Ok(Answer::Quit),
                _ => {}
            }
        }
    }

    fn list(&mut self, archive: &Archive, parent: &str) {
        let width = 28usize.saturating_sub(parent.len());
        for object in archive.iter() {
            let path = format!("{}{}", parent, object.name());
            if self.selector.selects(&path) {
                if self.cli.verbose {
                    println!();
                }
                println!(
                    "- {} - {}{:<width$} - {}",
                    object.tag,
                    parent,
                    object.name(),
                    self.session.registry.describe(object)
                );
                if self.cli.verbose {
                    for property in object.properties.iter() {
                        println!("  . {} '{}'", property.tag, property.value);
                    }
                }
            }
            if let Some(nested) = object.archive() {
                self.list(nested, &format!("{}/", path));
            }
        }
    }

    fn set_properties(&mut self, archive: &mut Archive, parent: &str) {
        for object in archive.iter_mut() {
            let path = format!("{}{}", parent, object.name());
            if self.selector.matches(&path) {
                for prop in &self.props {
                    let (key, value) = prop.split_once('=').unwrap_or((prop.as_str(), ""));
                    let tag = Tag::clean(key);
                    if self.cli.verbose {
                        if value.is_empty() {
                            info!("{}: clearing property {}", path, tag);
                        } else {
                            info!("{}: setting property {} = '{}'", path, tag, value);
                        }
                    }
                    object.set_property(tag, value);
                    self.changed = true;
                }
            }
            if let Some(nested) = object.archive_mut() {
                self.set_properties(nested, &format!("{}/", path));
            }
        }
    }
}

fn usage(kind: ErrorKind, message: &str) -> clap::Error {
    Cli::command().error(kind, message)
}

/// Errors from grabbing and exporting are reported where they happen.
fn report(err: &Error) {
    match err {
        Error::GrabError { .. } | Error::ExportError { .. } => {}
        other => error!("Error: {}", other),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => err.exit(),
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    let mut dat = match Dat::new(cli) {
        Ok(dat) => dat,
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    match dat.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}
