use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use colored::*;
use dialoguer::Confirm;
use log::{debug, warn};

use crate::{
    disk::init::reformat_image,
    fs::{config::FormatOptions, error::FileSystemError, FileSystem},
    shell::parse::{parse_command, ParseError},
};

/// `load` 的最大嵌套层数
const MAX_LOAD_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Cp(String, String),
    Mv(String, String),
    Rm(String),
    Mkdir(String),
    Rmdir(String),
    Ls(Option<String>),
    Cat(String),
    Cd(Option<String>),
    Pwd,
    Info(String),
    Incp(String, Option<String>),
    Outcp(String, String),
    Load(String),
    Format(u64),
    Slink(String, String),
    Printfs,
    Help,
    Quit,
}

/// 执行完一条命令后会话是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// 一个打开的镜像及其命令行状态
pub struct Session {
    fs: FileSystem,
    image: PathBuf,
    options: FormatOptions,
    interactive: bool, // 只有交互模式下 format 才需要确认
    load_depth: usize,
}

impl Session {
    pub fn new(fs: FileSystem, image: PathBuf, options: FormatOptions, interactive: bool) -> Self {
        Self {
            fs,
            image,
            options,
            interactive,
            load_depth: 0,
        }
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn working_directory(&self) -> &str {
        self.fs.working_directory()
    }

    /// 解析并执行一行输入
    pub fn run_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Flow> {
        match parse_command(line) {
            Ok(cmd) => execute_command(&cmd, self, out),
            Err(ParseError::Empty) => Ok(Flow::Continue),
            Err(e) => {
                writeln!(out, "{}", e)?;
                Ok(Flow::Continue)
            }
        }
    }

    /// `load`：逐行回放宿主机上的脚本，每行先回显再执行
    pub fn run_script<W: Write>(&mut self, script: &Path, out: &mut W) -> io::Result<Flow> {
        if self.load_depth >= MAX_LOAD_DEPTH {
            warn!(
                "load nested deeper than {} levels, skipping {}",
                MAX_LOAD_DEPTH,
                script.display()
            );
            writeln!(out, "IO ERROR")?;
            return Ok(Flow::Continue);
        }
        let text = match fs::read_to_string(script) {
            Ok(text) => text,
            Err(e) => {
                debug!("cannot read script {}: {}", script.display(), e);
                writeln!(out, "FILE NOT FOUND")?;
                return Ok(Flow::Continue);
            }
        };

        self.load_depth += 1;
        let result = self.replay(&text, out);
        self.load_depth -= 1;

        let flow = result?;
        if flow == Flow::Continue {
            writeln!(out, "OK")?;
        }
        Ok(flow)
    }

    fn replay<W: Write>(&mut self, text: &str, out: &mut W) -> io::Result<Flow> {
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            writeln!(out, "> {}", line)?;
            if self.run_line(line, out)? == Flow::Quit {
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    fn format(&mut self, disk_size: u64) -> Result<(), FileSystemError> {
        let options = self.options.with_disk_size(disk_size);
        self.fs = reformat_image(&self.image, &options)?;
        self.options = options;
        Ok(())
    }

    /// 交互模式且不在脚本中时，格式化前先确认
    fn confirm_format(&self, disk_size: u64) -> bool {
        if !self.interactive || self.load_depth > 0 {
            return true;
        }
        Confirm::new()
            .with_prompt(format!(
                "Erase {} and format {} bytes?",
                self.image.display(),
                disk_size
            ))
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

/// 固定诊断文本，不带颜色，方便脚本匹配
fn report<W: Write>(out: &mut W, err: &FileSystemError) -> io::Result<()> {
    debug!("command failed: {}", err);
    writeln!(out, "{}", err.diagnostic())
}

fn ok_or_report<W: Write, T>(out: &mut W, result: Result<T, FileSystemError>) -> io::Result<()> {
    match result {
        Ok(_) => writeln!(out, "OK"),
        Err(e) => report(out, &e),
    }
}

pub fn execute_command<W: Write>(
    cmd: &Command,
    session: &mut Session,
    out: &mut W,
) -> io::Result<Flow> {
    let fs = &mut session.fs;
    match cmd {
        Command::Cp(src, dst) => ok_or_report(out, fs.copy(src, dst))?,
        Command::Mv(src, dst) => ok_or_report(out, fs.move_entry(src, dst))?,
        Command::Rm(path) => ok_or_report(out, fs.remove_file(path))?,
        Command::Mkdir(path) => ok_or_report(out, fs.make_directory(path))?,
        Command::Rmdir(path) => ok_or_report(out, fs.remove_directory(path))?,
        Command::Ls(path) => match fs.list(path.as_deref()) {
            Ok(entries) => {
                writeln!(out, "Total items: {}", entries.len())?;
                for entry in entries {
                    writeln!(out, "{}", entry)?;
                }
            }
            Err(e) => report(out, &e)?,
        },
        Command::Cat(path) => {
            // 先读进缓冲区，出错时不会输出半个文件
            let mut content = Vec::new();
            match fs.read_file(path, &mut content) {
                Ok(_) => {
                    out.write_all(&content)?;
                    writeln!(out)?;
                }
                Err(e) => report(out, &e)?,
            }
        }
        Command::Cd(path) => {
            if let Err(e) = fs.change_directory(path.as_deref()) {
                report(out, &e)?;
            }
        }
        Command::Pwd => writeln!(out, "{}", fs.working_directory())?,
        Command::Info(path) => match fs.info(path) {
            Ok(info) => writeln!(out, "{}", info)?,
            Err(e) => report(out, &e)?,
        },
        Command::Incp(host, dst) => {
            ok_or_report(out, fs.import_host_file(Path::new(host), dst.as_deref()))?
        }
        Command::Outcp(path, host) => ok_or_report(out, fs.export_file(path, Path::new(host)))?,
        Command::Load(script) => return session.run_script(Path::new(script), out),
        Command::Format(size) => {
            if session.confirm_format(*size) {
                ok_or_report(out, session.format(*size))?;
            } else {
                writeln!(out, "{}", "format cancelled".yellow())?;
            }
        }
        Command::Slink(target, link) => ok_or_report(out, fs.symlink(target, link))?,
        Command::Printfs => {
            write!(out, "{}", fs.dump())?;
            match fs.verify() {
                Ok(()) => writeln!(out, "CONSISTENT")?,
                Err(e) => writeln!(out, "INCONSISTENT: {}", e)?,
            }
        }
        Command::Help => print_help(out)?,
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

pub fn print_help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", "pseudo-fs commands".bright_cyan().bold())?;
    writeln!(
        out,
        "{}",
        "
  cp <src> <dst>          Copy a file
  mv <src> <dst>          Move or rename a file
  rm <file>               Remove a file
  mkdir <dir>             Create a directory
  rmdir <dir>             Remove an empty directory
  ls [dir]                List a directory
  cat <file>              Print file contents
  cd [dir]                Change directory (root when omitted)
  pwd                     Print current path
  info <path>             Show i-node details
  incp <host-file> [dst]  Import a host file
  outcp <file> <host-dir> Export a file to the host
  load <host-script>      Run commands from a host file
  format <size>           Recreate the disk, e.g. format 600MB
  slink <target> <link>   Create a symbolic link in the current directory
  printfs                 Dump superblock, bitmap and i-nodes
  help                    Show this help message
  quit                    Leave the shell
"
        .bright_black()
    )
}
