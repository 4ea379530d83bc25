//! llama.cpp `main` invocation builder.

use herd_core::{DEFAULT_THREADS, LaunchSpec};
use std::path::PathBuf;

/// Builder for one llama.cpp generation invocation.
///
/// Arguments come out in a fixed order:
/// `--threads N -m MODEL [--ctx-size N] <model args> (--reverse-prompt S)* -p PROMPT`.
///
/// # Example
///
/// ```rust,ignore
/// let spec = LlamaInvocation::new("/opt/llama.cpp/main", "/models/7B.bin", "Hello")
///     .threads(8)
///     .reverse_prompts(["User:"])
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct LlamaInvocation {
    executable: PathBuf,
    model_path: PathBuf,
    prompt: String,
    threads: u32,
    ctx_size: Option<u32>,
    model_args: Vec<String>,
    reverse_prompts: Vec<String>,
}

impl LlamaInvocation {
    pub fn new(
        executable: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            model_path: model_path.into(),
            prompt: prompt.into(),
            threads: DEFAULT_THREADS,
            ctx_size: None,
            model_args: Vec::new(),
            reverse_prompts: Vec::new(),
        }
    }

    #[must_use]
    pub const fn threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub const fn ctx_size(mut self, ctx_size: Option<u32>) -> Self {
        self.ctx_size = ctx_size;
        self
    }

    /// Sampling flags, already in command-line form.
    #[must_use]
    pub fn model_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.model_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// One `--reverse-prompt` pair per stop sequence.
    #[must_use]
    pub fn reverse_prompts(mut self, stops: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.reverse_prompts
            .extend(stops.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> LaunchSpec {
        let mut args = vec![
            "--threads".to_string(),
            self.threads.to_string(),
            "-m".to_string(),
            self.model_path.to_string_lossy().into_owned(),
        ];

        if let Some(ctx) = self.ctx_size {
            args.push("--ctx-size".to_string());
            args.push(ctx.to_string());
        }

        args.extend(self.model_args);

        for stop in self.reverse_prompts {
            args.push("--reverse-prompt".to_string());
            args.push(stop);
        }

        args.push("-p".to_string());
        args.push(self.prompt);

        LaunchSpec {
            executable: self.executable,
            model_path: self.model_path,
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_orders_arguments() {
        let spec = LlamaInvocation::new("/opt/llama.cpp/main", "/models/a.bin", "Hello")
            .threads(4)
            .model_args(["--temp", "0.7"])
            .reverse_prompts(["STOP", "User:"])
            .build();

        assert_eq!(
            spec.args,
            vec![
                "--threads",
                "4",
                "-m",
                "/models/a.bin",
                "--temp",
                "0.7",
                "--reverse-prompt",
                "STOP",
                "--reverse-prompt",
                "User:",
                "-p",
                "Hello",
            ]
        );
        assert_eq!(spec.executable, PathBuf::from("/opt/llama.cpp/main"));
    }

    #[test]
    fn builder_defaults_threads_and_adds_ctx_size() {
        let spec = LlamaInvocation::new("main", "m.bin", "p")
            .ctx_size(Some(2048))
            .build();
        assert_eq!(&spec.args[..2], ["--threads", "7"]);
        assert_eq!(&spec.args[4..6], ["--ctx-size", "2048"]);
    }
}
