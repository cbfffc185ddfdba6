//! End-to-end pipeline scenarios.

#[cfg(test)]
mod tests {
    use crate::core::Halt;
    use crate::driver::{BuildRequest, Converter, ConverterArgs, Docmaker};
    use crate::errors::DocflowError;
    use crate::events::CollectingEventSink;
    use crate::options::load_options_from_str;
    use crate::plugins::{HackRegistry, HackTable, PluginRegistry};
    use mockall::mock;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    mock! {
        pub Conv {}

        impl Converter for Conv {
            fn convert_to_docx(
                &self,
                srcfile: &Path,
                docxfile: &Path,
                args: &ConverterArgs,
            ) -> anyhow::Result<()>;
            fn save_docx(&self, converted: &Path, docxfile: &Path) -> anyhow::Result<()>;
            fn convert_to_pdf(&self, docxfile: &Path, pdffile: &Path, format: &str) -> anyhow::Result<()>;
        }
    }

    const SOURCE: &str = "---\ntitle: Q3 Report\n---\n# Revenue\n";

    type Shared<T> = Arc<Mutex<Vec<T>>>;

    struct Workspace {
        dir: TempDir,
        src: PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("report.md");
            fs::write(&src, SOURCE).unwrap();
            Self { dir, src }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        /// A request whose derived output lands beside the source.
        fn request(&self) -> BuildRequest {
            BuildRequest::new(&self.src).with_working_dir(self.dir.path())
        }
    }

    fn docmaker<R>(register: R) -> Docmaker
    where
        R: Fn(&mut HackTable) + Send + Sync + 'static,
    {
        let mut hacks = HackRegistry::new();
        hacks.register_package("test.hacks", register);
        Docmaker::new(Arc::new(PluginRegistry::with_builtin()), Arc::new(hacks))
    }

    fn record_tmpdir(table: &mut HackTable, seen: &Shared<PathBuf>) {
        let seen = Arc::clone(seen);
        table.add("record_tmpdir", "post_setup_tmpdir", move |ctx| {
            if let Some(dir) = ctx.temp_dir() {
                seen.lock().push(dir.to_path_buf());
            }
            Ok(())
        });
    }

    fn track_descriptors(table: &mut HackTable, counts: &Shared<usize>) {
        let opened = Arc::clone(counts);
        table.add("open_scratch_file", "post_setup_tmpdir", move |ctx| {
            ctx.allocate_temp_file(Some(".log"), Some(b"scratch"))?;
            opened.lock().push(ctx.open_temp_descriptors());
            Ok(())
        });
        let closed = Arc::clone(counts);
        table.add("count_after_cleanup", "post_cleanup_tmpdir", move |ctx| {
            closed.lock().push(ctx.open_temp_descriptors());
            Ok(())
        });
    }

    fn assert_released(seen: &Shared<PathBuf>) {
        let dirs = seen.lock();
        assert_eq!(dirs.len(), 1);
        assert!(!dirs[0].exists(), "temporary area {} still exists", dirs[0].display());
    }

    fn mock_converter() -> MockConv {
        let mut converter = MockConv::new();
        converter
            .expect_convert_to_docx()
            .returning(|_src, docx, _args| {
                fs::write(docx, b"docx")?;
                Ok(())
            });
        converter.expect_save_docx().returning(|converted, docx| {
            fs::copy(converted, docx)?;
            Ok(())
        });
        converter
    }

    #[test]
    fn test_markdown_to_docx() {
        let ws = Workspace::new();
        let seen = Shared::default();
        let counts = Shared::default();
        let (probe, counter) = (Arc::clone(&seen), Arc::clone(&counts));
        let docmaker = docmaker(move |table| {
            record_tmpdir(table, &probe);
            track_descriptors(table, &counter);
        });

        let outcome = docmaker
            .build(ws.request().with_option("output", "docx"))
            .unwrap();

        assert_eq!(outcome.output, Some(ws.path("report.docx")));
        assert_eq!(fs::read_to_string(ws.path("report.docx")).unwrap(), SOURCE);
        assert!(!outcome.is_aborted());
        assert_eq!(
            outcome.stages(),
            vec![
                "initialize",
                "setup_tmpdir",
                "collect_metadata",
                "collect_extra_args",
                "collect_converter_args",
                "convert_to_docx",
                "save_docx",
                "finalize_docx",
                "finalize",
                "cleanup_tmpdir",
            ]
        );
        assert_released(&seen);
        assert_eq!(*counts.lock(), vec![1, 0]);
    }

    #[test]
    fn test_default_output_is_pdf() {
        let ws = Workspace::new();
        let docmaker = docmaker(|_table| {});

        let outcome = docmaker.build(ws.request()).unwrap();

        assert_eq!(outcome.output, Some(ws.path("report.pdf")));
        assert_eq!(fs::read_to_string(ws.path("report.pdf")).unwrap(), SOURCE);
    }

    #[test]
    fn test_derived_output_ignores_source_directory() {
        let ws = Workspace::new();
        let nested = ws.path("chapters/intro.md");
        fs::create_dir_all(ws.path("chapters")).unwrap();
        fs::write(&nested, "# Intro\n").unwrap();
        let docmaker = docmaker(|_table| {});

        let outcome = docmaker
            .build(BuildRequest::new(&nested).with_working_dir(ws.dir.path()))
            .unwrap();

        assert_eq!(outcome.output, Some(ws.path("intro.pdf")));
        assert!(!ws.path("chapters/intro.pdf").exists());
    }

    #[test]
    fn test_run_with_explicit_output() {
        let ws = Workspace::new();
        let docmaker = docmaker(|_table| {});

        let output = docmaker.run(&ws.src, Some(ws.path("out/final.pdf"))).unwrap();

        assert_eq!(output, Some(ws.path("out/final.pdf")));
        assert_eq!(fs::read_to_string(ws.path("out/final.pdf")).unwrap(), SOURCE);
    }

    #[test]
    fn test_markdown_output_skips_conversion() {
        let ws = Workspace::new();
        let docmaker = docmaker(|_table| {});
        let target = ws.path("out/copy.md");

        let outcome = docmaker
            .build(
                ws.request()
                    .with_output_file(&target)
                    .with_option("output", "md"),
            )
            .unwrap();

        assert_eq!(outcome.output, Some(target.clone()));
        assert_eq!(fs::read_to_string(target).unwrap(), SOURCE);
        assert_eq!(
            outcome.stages(),
            vec!["initialize", "setup_tmpdir", "collect_metadata", "finalize", "cleanup_tmpdir"]
        );
    }

    #[test]
    fn test_abort_is_a_clean_early_stop() {
        let ws = Workspace::new();
        let seen = Shared::default();
        let cleaned = Shared::default();
        let counts = Shared::default();
        let (probe, cleanup_probe) = (Arc::clone(&seen), Arc::clone(&cleaned));
        let counter = Arc::clone(&counts);
        let docmaker = docmaker(move |table| {
            record_tmpdir(table, &probe);
            track_descriptors(table, &counter);
            table.add("stop_before_conversion", "pre_convert_to_docx", |_ctx| {
                Err(Halt::abort("nothing to convert"))
            });
            let cleanup_probe = Arc::clone(&cleanup_probe);
            table.add("after_cleanup", "post_cleanup_tmpdir", move |ctx| {
                cleanup_probe.lock().push(ctx.temp_dir().is_none());
                Ok(())
            });
        });
        let sink = Arc::new(CollectingEventSink::new());
        let docmaker = docmaker.with_event_sink(sink.clone());

        let outcome = docmaker.build(ws.request()).unwrap();

        assert_eq!(outcome.aborted.as_deref(), Some("nothing to convert"));
        assert_eq!(outcome.output, None);
        assert!(!ws.path("report.pdf").exists());
        assert_eq!(
            outcome.stages(),
            vec!["initialize", "setup_tmpdir", "collect_metadata", "cleanup_tmpdir"]
        );
        assert_eq!(*cleaned.lock(), vec![true]);
        assert_eq!(*counts.lock(), vec![1, 0]);
        assert_released(&seen);

        let events = sink.event_types();
        assert!(events.contains(&"run.aborted".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("run.completed"));
    }

    #[test]
    fn test_error_propagates_after_cleanup() {
        let ws = Workspace::new();
        let seen = Shared::default();
        let scratch: Shared<PathBuf> = Shared::default();
        let (probe, scratch_probe) = (Arc::clone(&seen), Arc::clone(&scratch));
        let docmaker = docmaker(move |table| {
            record_tmpdir(table, &probe);
            let scratch_probe = Arc::clone(&scratch_probe);
            table.add("open_scratch_file", "post_setup_tmpdir", move |ctx| {
                let path = ctx.allocate_temp_file(Some(".log"), Some(b"scratch"))?;
                scratch_probe.lock().push(path);
                Ok(())
            });
            table.add("reject_docx", "post_save_docx", |_ctx| {
                Err(anyhow::anyhow!("corrupt docx").into())
            });
        });
        let sink = Arc::new(CollectingEventSink::new());
        let docmaker = docmaker.with_event_sink(sink.clone());

        let err = docmaker.build(ws.request()).unwrap_err();

        assert!(matches!(err, DocflowError::Runtime(_)));
        assert_eq!(err.to_string(), "corrupt docx");
        assert!(!ws.path("report.pdf").exists());
        assert_released(&seen);
        let scratch = scratch.lock();
        assert_eq!(scratch.len(), 1);
        assert!(!scratch[0].exists());
        assert_eq!(sink.events_of_type("run.failed").len(), 1);
    }

    #[test]
    fn test_pdf_conversion_retries() {
        let ws = Workspace::new();
        let mut converter = mock_converter();
        let mut attempts = 0;
        converter
            .expect_convert_to_pdf()
            .times(3)
            .returning(move |_docx, pdf, format| {
                attempts += 1;
                if attempts < 3 {
                    return Err(anyhow::anyhow!("converter busy"));
                }
                assert_eq!(format, "pdf");
                fs::write(pdf, b"%PDF")?;
                Ok(())
            });
        let docmaker = docmaker(|_table| {}).with_converter(Arc::new(converter));

        let outcome = docmaker.build(ws.request()).unwrap();

        assert_eq!(outcome.output, Some(ws.path("report.pdf")));
        assert_eq!(fs::read(ws.path("report.pdf")).unwrap(), b"%PDF");
    }

    #[test]
    fn test_pdf_conversion_gives_up() {
        let ws = Workspace::new();
        let seen = Shared::default();
        let probe = Arc::clone(&seen);
        let mut converter = mock_converter();
        converter
            .expect_convert_to_pdf()
            .times(2)
            .returning(|_docx, _pdf, _format| Err(anyhow::anyhow!("converter busy")));
        let docmaker = docmaker(move |table| record_tmpdir(table, &probe))
            .with_converter(Arc::new(converter));

        let err = docmaker
            .build(ws.request().with_option("converter.retries", 2))
            .unwrap_err();

        assert_eq!(err.to_string(), "converter busy");
        assert_released(&seen);
    }

    #[test]
    fn test_converter_args_collected_from_options_and_handlers() {
        let ws = Workspace::new();
        let mut converter = MockConv::new();
        converter
            .expect_convert_to_docx()
            .withf(|_src, _docx, args| {
                args.format.as_deref() == Some("md")
                    && args.to == "docx"
                    && args.extra_args == vec!["--toc".to_string(), "--number-sections".to_string()]
            })
            .times(1)
            .returning(|_src, docx, _args| {
                fs::write(docx, b"docx")?;
                Ok(())
            });
        converter.expect_save_docx().returning(|converted, docx| {
            fs::copy(converted, docx)?;
            Ok(())
        });

        let docmaker = docmaker(|table| {
            table.add("number_sections", "post_collect_extra_args", |ctx| {
                let mut args = ctx.attrs.require("extra_args")?.clone();
                if let Value::Array(items) = &mut args {
                    items.push(json!("--number-sections"));
                }
                ctx.attrs.set("extra_args", args);
                Ok(())
            });
        })
        .with_converter(Arc::new(converter));

        let outcome = docmaker
            .build(
                ws.request()
                    .with_option("output", "docx")
                    .with_option("converter.extra_args", json!(["--toc"])),
            )
            .unwrap();
        assert_eq!(outcome.output, Some(ws.path("report.docx")));
    }

    #[test]
    fn test_draft_mode_prefixes_output() {
        let ws = Workspace::new();
        let docmaker = docmaker(|_table| {})
            .with_features(["DraftMode"])
            .unwrap();

        let outcome = docmaker
            .build(
                ws.request()
                    .with_option("output", "docx")
                    .with_option("draft_mode.is_draft", "yes"),
            )
            .unwrap();

        assert_eq!(outcome.output, Some(ws.path("DRAFT_report.docx")));
        assert!(!Path::new("DRAFT_report.docx").exists());
        assert!(!ws.path("report.docx").exists());
    }

    #[test]
    fn test_draft_mode_keeps_explicit_output() {
        let ws = Workspace::new();
        let docmaker = docmaker(|_table| {});

        let outcome = docmaker
            .build(
                ws.request()
                    .with_feature("DraftMode")
                    .with_output_file(ws.path("final.docx"))
                    .with_option("output", "docx")
                    .with_option("draft_mode.is_draft", true),
            )
            .unwrap();

        assert_eq!(outcome.output, Some(ws.path("final.docx")));
    }

    #[test]
    fn test_markdown_metadata_and_metadata_options() {
        let ws = Workspace::new();
        let collected: Shared<(String, Value)> = Shared::default();
        let probe = Arc::clone(&collected);
        let docmaker = docmaker(move |table| {
            let probe = Arc::clone(&probe);
            table.add("capture_metadata", "post_collect_metadata", move |ctx| {
                let mut seen = probe.lock();
                seen.extend(ctx.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            });
        });

        docmaker
            .build(
                ws.request()
                    .with_feature("MarkdownMetadata")
                    .with_option("output", "md")
                    .with_option("metadata", json!({"author": "Ada"})),
            )
            .unwrap();

        assert_eq!(
            *collected.lock(),
            vec![
                ("title".to_string(), json!("Q3 Report")),
                ("author".to_string(), json!("Ada")),
            ]
        );
    }

    #[test]
    fn test_scheduling_conflict_runs_no_handler() {
        let ws = Workspace::new();
        let seen = Shared::default();
        let ran: Shared<&'static str> = Shared::default();
        let (probe, ran_probe) = (Arc::clone(&seen), Arc::clone(&ran));
        let docmaker = docmaker(move |table| {
            record_tmpdir(table, &probe);
            let first = Arc::clone(&ran_probe);
            table
                .add("first", "pre_finalize", move |_ctx| {
                    first.lock().push("first");
                    Ok(())
                })
                .before("second");
            let second = Arc::clone(&ran_probe);
            table
                .add("second", "pre_finalize", move |_ctx| {
                    second.lock().push("second");
                    Ok(())
                })
                .before("first");
        });

        let err = docmaker.build(ws.request()).unwrap_err();

        match err {
            DocflowError::SchedulingConflict(conflict) => {
                assert_eq!(conflict.hook, "pre_finalize");
                assert_eq!(conflict.error_info.code, "HOOK-001-CYCLE");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ran.lock().is_empty());
        assert_released(&seen);
    }

    #[test]
    fn test_unknown_feature_fails_before_run() {
        let ws = Workspace::new();
        let seen = Shared::default();
        let probe = Arc::clone(&seen);
        let docmaker = docmaker(move |table| record_tmpdir(table, &probe));

        let err = docmaker
            .build(ws.request().with_feature("Watermark"))
            .unwrap_err();

        assert!(matches!(err, DocflowError::PluginNotFound(_)));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_disabled_hack_does_not_run() {
        let ws = Workspace::new();
        let docmaker = docmaker(|table| {
            table.add("refuse", "pre_initialize", |_ctx| Err(Halt::abort("refused")));
        });

        let aborted = docmaker.build(ws.request()).unwrap();
        assert!(aborted.is_aborted());

        let outcome = docmaker
            .build(ws.request().with_option("hacks.disable_refuse", "yes"))
            .unwrap();
        assert!(!outcome.is_aborted());
        assert_eq!(outcome.output, Some(ws.path("report.pdf")));
    }

    #[test]
    fn test_loaded_options_configure_the_driver() {
        let ws = Workspace::new();
        let loaded = load_options_from_str(
            "features:\n  - DraftMode\noutput: docx\ndraft_mode:\n  is_draft: yes\n  prefix: WIP\n",
            ws.dir.path(),
        )
        .unwrap();
        let docmaker = Docmaker::with_builtin().with_loaded_options(loaded).unwrap();

        let outcome = docmaker.build(ws.request()).unwrap();
        assert_eq!(outcome.output, Some(ws.path("WIP_report.docx")));
    }

    #[tokio::test]
    async fn test_build_all_runs_independent_builds() {
        let ws = Workspace::new();
        let requests: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| {
                let src = ws.path(&format!("{name}.md"));
                fs::write(&src, format!("# {name}")).unwrap();
                BuildRequest::new(src)
                    .with_working_dir(ws.dir.path())
                    .with_option("output", "docx")
            })
            .collect();
        let docmaker = Arc::new(docmaker(|_table| {}));

        let results = docmaker.build_all(requests).await;

        let outcomes: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        let outputs: Vec<_> = outcomes.iter().filter_map(|o| o.output.clone()).collect();
        assert_eq!(
            outputs,
            vec![ws.path("a.docx"), ws.path("b.docx"), ws.path("c.docx")]
        );
        assert_ne!(outcomes[0].run_id, outcomes[1].run_id);
        assert_eq!(fs::read_to_string(ws.path("c.docx")).unwrap(), "# c");
    }
}
