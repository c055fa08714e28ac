/// How an output redirection opens its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// `>`
    Truncate,
    /// `>>`
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRedirect {
    pub path: String,
    pub mode: OutputMode,
}

/// One command of a pipeline: argv plus at most one redirection per direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    argv: Vec<String>,
    pub input: Option<String>,
    pub output: Option<OutputRedirect>,
}

impl Stage {
    /// Returns `None` for an empty argument vector; a stage always names a program.
    pub fn new(argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        Some(Self {
            argv,
            input: None,
            output: None,
        })
    }

    pub fn with_input(mut self, path: impl Into<String>) -> Self {
        self.input = Some(path.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<String>, mode: OutputMode) -> Self {
        self.output = Some(OutputRedirect {
            path: path.into(),
            mode,
        });
        self
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// 1..=N stages wired left to right. Built once per request, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn from_stages(stages: Vec<Stage>) -> Option<Self> {
        if stages.is_empty() {
            None
        } else {
            Some(Self { stages })
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn first(&self) -> &Stage {
        &self.stages[0]
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_reject_empty() {
        assert!(Stage::new(Vec::new()).is_none());
        assert!(Pipeline::from_stages(Vec::new()).is_none());
    }

    #[test]
    fn test_pipeline_accessors() {
        let stage = Stage::new(vec!["wc".into(), "-l".into()])
            .unwrap()
            .with_input("in.txt")
            .with_output("out.txt", OutputMode::Append);
        let pipeline = Pipeline::from_stages(vec![stage]).unwrap();

        assert_eq!(pipeline.len(), 1);
        assert!(!pipeline.is_empty());
        assert_eq!(pipeline.first().program(), "wc");
        assert_eq!(pipeline.first().args(), &["-l".to_string()]);
        assert_eq!(pipeline.first().input.as_deref(), Some("in.txt"));
        assert_eq!(pipeline.first().output.as_ref().unwrap().mode, OutputMode::Append);
    }
}
