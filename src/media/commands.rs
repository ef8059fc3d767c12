use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::ToolInvocationError;
use super::SubtitleTrack;

/// Captured result of a finished tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn first_line(&self) -> String {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("Unknown version")
            .to_string()
    }
}

/// External tool invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    pub timeout: Option<Duration>,
    /// Non-zero exit codes that still count as success
    pub accepted_codes: Vec<i32>,
}

impl ToolCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            timeout: None,
            accepted_codes: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add a file path argument
    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn accept_exit_code(mut self, code: i32) -> Self {
        self.accepted_codes.push(code);
        self
    }

    fn tool_name(&self) -> String {
        Path::new(&self.binary_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.binary_path.clone())
    }

    /// Run to completion; a timeout kills the child.
    pub async fn execute(&self) -> Result<ToolOutput, ToolInvocationError> {
        debug!("Executing {}: {} {:?}", self.description, self.binary_path, self.args);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ToolInvocationError::Launch {
            tool: self.tool_name(),
            message: e.to_string(),
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ToolInvocationError::Timeout {
                    tool: self.tool_name(),
                    seconds: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| ToolInvocationError::Launch {
            tool: self.tool_name(),
            message: e.to_string(),
        })?;

        let result = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        let accepted = output.status.success()
            || result.code.is_some_and(|code| self.accepted_codes.contains(&code));
        if !accepted {
            let detail = if result.stderr.trim().is_empty() {
                &result.stdout
            } else {
                &result.stderr
            };
            return Err(ToolInvocationError::NonZeroExit {
                tool: self.tool_name(),
                code: result.code,
                stderr: detail.trim().to_string(),
            });
        }

        Ok(result)
    }
}

/// Fail with `MissingOutput` unless the tool left a file at `path`.
pub async fn ensure_output(tool: &str, path: &Path) -> Result<(), ToolInvocationError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(ToolInvocationError::MissingOutput {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        }),
    }
}

/// Locate a tool binary. The configured name is tried first, then `alternatives`;
/// each is looked up as given, in `./tools` and on `PATH`. Falls back to
/// `configured` unchanged so the launch error names it.
pub fn resolve_binary(configured: &str, alternatives: &[&str]) -> String {
    let mut search_dirs = vec![PathBuf::from("tools")];
    if let Some(path) = std::env::var_os("PATH") {
        search_dirs.extend(std::env::split_paths(&path));
    }
    resolve_binary_in(configured, alternatives, &search_dirs)
}

fn resolve_binary_in(configured: &str, alternatives: &[&str], search_dirs: &[PathBuf]) -> String {
    for name in std::iter::once(configured).chain(alternatives.iter().copied()) {
        let path = Path::new(name);
        if path.is_file() {
            return PathBuf::from(".").join(path).to_string_lossy().into_owned();
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        for dir in search_dirs {
            for executable in executable_names(file_name) {
                let candidate = dir.join(executable);
                if candidate.is_file() {
                    debug!("Resolved {} to {}", configured, candidate.display());
                    return candidate.to_string_lossy().into_owned();
                }
            }
        }
    }
    configured.to_string()
}

fn executable_names(name: &OsStr) -> Vec<OsString> {
    let mut names = vec![name.to_os_string()];
    if cfg!(windows) && Path::new(name).extension().is_none() {
        let mut exe = name.to_os_string();
        exe.push(".exe");
        names.push(exe);
    }
    names
}

/// Builds the command lines of the synchronizer and multiplexer
pub struct ToolCommandBuilder {
    binary_path: String,
    timeout: Duration,
}

impl ToolCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout,
        }
    }

    /// `alass-cli <video> <subtitle> <output>`
    pub fn synchronize(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "Subtitle synchronization")
            .path(video_path)
            .path(subtitle_path)
            .path(output_path)
            .timeout(self.timeout)
    }

    /// `mkvmerge -o <output> <video> [--language 0:<tag> --track-name 0:<name>
    /// --default-track-flag 0:yes|no <sub>]...`
    ///
    /// mkvmerge exits with 1 when it only emitted warnings.
    pub fn multiplex(
        &self,
        video_path: &Path,
        tracks: &[SubtitleTrack],
        output_path: &Path,
    ) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.binary_path, "Subtitle embedding")
            .arg("-o")
            .path(output_path)
            .path(video_path);

        for track in tracks {
            cmd = cmd
                .arg("--language")
                .arg(format!("0:{}", track.language))
                .arg("--track-name")
                .arg(format!("0:{}", track.name))
                // mkvmerge marks new tracks default unless told otherwise
                .arg("--default-track-flag")
                .arg(if track.default_track { "0:yes" } else { "0:no" })
                .path(&track.path);
        }

        cmd.timeout(self.timeout).accept_exit_code(1)
    }

    pub fn version_check(&self) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "Version check")
            .arg("--version")
            .timeout(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn track(path: &str, default_track: bool) -> SubtitleTrack {
        SubtitleTrack {
            path: PathBuf::from(path),
            language: "heb".to_string(),
            name: "Hebrew".to_string(),
            default_track,
        }
    }

    #[test]
    fn synchronize_argument_order() {
        let cmd = ToolCommandBuilder::new("alass-cli", Duration::from_secs(5)).synchronize(
            Path::new("ep.mkv"),
            Path::new("ep.srt"),
            Path::new("out/ep.srt"),
        );

        assert_eq!(cmd.args, vec!["ep.mkv", "ep.srt", "out/ep.srt"]);
        assert_eq!(cmd.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn multiplex_tags_every_track() {
        let cmd = ToolCommandBuilder::new("mkvmerge", Duration::from_secs(5)).multiplex(
            Path::new("ep.mkv"),
            &[track("he.srt", true), track("he2.srt", false)],
            Path::new("Output/ep.mkv"),
        );

        assert_eq!(
            cmd.args.join(" "),
            "-o Output/ep.mkv ep.mkv \
             --language 0:heb --track-name 0:Hebrew --default-track-flag 0:yes he.srt \
             --language 0:heb --track-name 0:Hebrew --default-track-flag 0:no he2.srt"
        );
        assert_eq!(cmd.accepted_codes, vec![1]);
    }

    #[test]
    fn binary_lookup_tries_tools_folder_then_path() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools");
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&tools).unwrap();
        std::fs::create_dir_all(&bin).unwrap();
        let dirs = vec![tools.clone(), bin.clone()];
        let display = |p: PathBuf| p.to_string_lossy().to_string();

        std::fs::write(bin.join("alass"), "").unwrap();
        assert_eq!(resolve_binary_in("alass-cli", &["alass"], &dirs), display(bin.join("alass")));

        std::fs::write(tools.join("alass-cli"), "").unwrap();
        assert_eq!(
            resolve_binary_in("alass-cli", &["alass"], &dirs),
            display(tools.join("alass-cli"))
        );

        let custom = dir.path().join("custom-alass");
        std::fs::write(&custom, "").unwrap();
        assert_eq!(resolve_binary_in(&display(custom.clone()), &["alass"], &dirs), display(custom));

        assert_eq!(resolve_binary_in("missing-tool", &[], &dirs), "missing-tool");
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let result = ToolCommand::new("/nonexistent/seasonsub-tool", "test").execute().await;
        assert!(matches!(result, Err(ToolInvocationError::Launch { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_codes_are_checked() {
        let failing = ToolCommand::new("sh", "test").args(["-c", "echo bad >&2; exit 2"]);
        match failing.execute().await {
            Err(ToolInvocationError::NonZeroExit { tool, code, stderr }) => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "bad");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let warning = ToolCommand::new("sh", "test").args(["-c", "exit 1"]).accept_exit_code(1);
        assert_eq!(warning.execute().await.unwrap().code, Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tools_time_out() {
        let result = ToolCommand::new("sh", "test")
            .args(["-c", "sleep 5"])
            .timeout(Duration::from_millis(100))
            .execute()
            .await;

        assert!(matches!(result, Err(ToolInvocationError::Timeout { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn first_line_prefers_stdout() {
        let output = ToolCommand::new("sh", "test")
            .args(["-c", "echo; echo 'tool v1.2'; echo more"])
            .execute()
            .await
            .unwrap();

        assert_eq!(output.first_line(), "tool v1.2");
    }

    #[tokio::test]
    async fn ensure_output_requires_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.srt");

        assert!(matches!(
            ensure_output("alass-cli", &path).await,
            Err(ToolInvocationError::MissingOutput { .. })
        ));
        std::fs::write(&path, "x").unwrap();
        assert!(ensure_output("alass-cli", &path).await.is_ok());
    }
}
