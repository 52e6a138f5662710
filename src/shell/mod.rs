pub mod command;
pub mod parse;

use std::{
    io::{self, stdout, BufRead, IsTerminal, Write},
    path::{Path, PathBuf},
};

use colored::*;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use log::warn;
use reedline::{
    default_emacs_keybindings, ColumnarMenu, DefaultCompleter, DefaultPrompt, DefaultPromptSegment,
    Emacs, FileBackedHistory, KeyCode, KeyModifiers, MenuBuilder, Reedline, ReedlineEvent,
    ReedlineMenu, Signal,
};

use crate::shell::{
    command::{Flow, Session},
    parse::VERBS,
};

const HISTORY_FILE: &str = ".pseudo_fs_history";
const HISTORY_SIZE: usize = 100;

/// 运行命令循环：先回放 `script`（如果有），然后读取标准输入。
/// 标准输入是终端时使用行编辑器，否则逐行读取。
pub fn start_shell(session: &mut Session, script: Option<&Path>) -> io::Result<()> {
    let mut out = stdout();

    if let Some(script) = script {
        if session.run_script(script, &mut out)? == Flow::Quit {
            return Ok(());
        }
    }

    if io::stdin().is_terminal() {
        interactive_loop(session)
    } else {
        piped_loop(session, &mut out)
    }
}

fn piped_loop<W: Write>(session: &mut Session, out: &mut W) -> io::Result<()> {
    for line in io::stdin().lock().lines() {
        if session.run_line(&line?, out)? == Flow::Quit {
            break;
        }
        out.flush()?;
    }
    Ok(())
}

fn interactive_loop(session: &mut Session) -> io::Result<()> {
    banner(session)?;

    let mut line_editor = line_editor();
    let user = whoami::username();
    let mut out = stdout();

    loop {
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(format!(
                "{}:{}",
                format!("{}@pseudo-fs", user).green().bold(),
                session.working_directory().blue()
            )),
            DefaultPromptSegment::Empty,
        );

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                if session.run_line(&buffer, &mut out)? == Flow::Quit {
                    break;
                }
            }
            Ok(Signal::CtrlC) => continue,
            Ok(Signal::CtrlD) => break,
            Ok(_) => continue,
            Err(e) => {
                println!("{} {}", "Error reading line:".red().bold(), e);
                break;
            }
        }
    }

    println!("{}", "GoodBye!".bright_yellow());
    Ok(())
}

/// 带历史记录和命令补全的行编辑器
fn line_editor() -> Reedline {
    let commands: Vec<String> = VERBS.iter().map(|v| v.to_string()).collect();
    let completer = Box::new(DefaultCompleter::new_with_wordlen(commands, 2));
    let completion_menu = Box::new(ColumnarMenu::default().with_name("completion_menu"));

    let mut keybindings = default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("completion_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );

    let mut editor = Reedline::create()
        .with_completer(completer)
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HISTORY_FILE);
    match FileBackedHistory::with_file(HISTORY_SIZE, history_path) {
        Ok(history) => editor = editor.with_history(Box::new(history)),
        Err(e) => warn!("command history disabled: {}", e),
    }
    editor
}

fn banner(session: &Session) -> io::Result<()> {
    let sb = session.fs().super_block();
    execute!(
        stdout(),
        SetForegroundColor(Color::Cyan),
        Print(format!("pseudo-fs v{}\n", env!("CARGO_PKG_VERSION"))),
        ResetColor
    )?;
    println!(
        "{}",
        format!(
            "{} clusters of {}B, {} of {} free, {} i-nodes",
            sb.cluster_count,
            sb.cluster_size,
            session.fs().bitmap().free_clusters(),
            sb.cluster_count,
            sb.inode_count
        )
        .bright_black()
    );
    println!(
        "{}",
        "Type 'help' for available commands. Use ↑↓ for history, Tab for auto-completion.\n"
            .bright_black()
    );
    Ok(())
}
