//! Integration tests for Shelf

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// A shelf command with its config, state, and cache dirs isolated
    /// under a temp home
    fn shelf(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("shelf");
        cmd.env("HOME", home.path())
            .env("XDG_CONFIG_HOME", home.path().join("config"))
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env("XDG_CACHE_HOME", home.path().join("cache"))
            .env("XDG_DATA_HOME", home.path().join("data"))
            .env_remove("SHELF_CONFIG");
        cmd.arg("--no-local");
        cmd
    }

    /// Write a global config declaring one pinned library with a
    /// `vars/greet` callable
    fn write_fixed_library_config(home: &TempDir, name: &str) {
        let tree = home.path().join("libsrc").join(name);
        let vars = tree.join("vars");
        std::fs::create_dir_all(&vars).unwrap();
        std::fs::write(vars.join("greet.src"), "def call() { }").unwrap();

        let config_dir = home.path().join("config").join("shelf");
        std::fs::create_dir_all(&config_dir).unwrap();
        let config = format!(
            r#"
[cache]
refresh = "never"

[[library]]
name = "{name}"
[library.retriever]
type = "fixed"
path = "{path}"
version = "1.0"
"#,
            path = tree.display()
        );
        std::fs::write(config_dir.join("config.toml"), config).unwrap();
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        shelf(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Shared Library Resolver"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        shelf(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("shelf"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        shelf(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        shelf(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_init_writes_file() {
        let home = TempDir::new().unwrap();
        shelf(&home).args(["config", "init"]).assert().success();

        let path = home
            .path()
            .join("config")
            .join("shelf")
            .join("config.toml");
        assert!(path.is_file());
    }

    #[test]
    fn list_empty() {
        let home = TempDir::new().unwrap();
        shelf(&home).arg("list").assert().success().stdout(
            predicate::str::contains("No libraries configured")
                .or(predicate::str::contains("NAME")),
        );
    }

    #[test]
    fn list_shows_configured_library() {
        let home = TempDir::new().unwrap();
        write_fixed_library_config(&home, "stuff");

        shelf(&home)
            .args(["list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stuff"));
    }

    #[test]
    fn cache_list_empty() {
        let home = TempDir::new().unwrap();
        shelf(&home)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache is empty").or(predicate::str::contains("NAME")));
    }

    #[test]
    fn resolve_unknown_library_fails() {
        let home = TempDir::new().unwrap();
        shelf(&home)
            .args(["resolve", "missing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown library"));
    }

    #[test]
    fn resolve_fixed_library_json() {
        let home = TempDir::new().unwrap();
        write_fixed_library_config(&home, "stuff");

        shelf(&home)
            .args(["resolve", "stuff", "--format", "json", "--no-trace"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains(r#""name": "stuff""#)
                    .and(predicate::str::contains(r#""version": "1.0""#))
                    .and(predicate::str::contains(r#""greet""#))
                    .and(predicate::str::contains(r#""trusted": true"#)),
            );
    }

    #[test]
    fn resolve_writes_record_trace() {
        let home = TempDir::new().unwrap();
        write_fixed_library_config(&home, "stuff");

        shelf(&home)
            .args([
                "resolve", "stuff", "--session", "build-42", "--format", "plain",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "LibraryRecord{name=stuff, version=1.0, variables=[greet], trusted=true}",
            ));

        let trace = home
            .path()
            .join("state")
            .join("shelf")
            .join("sessions")
            .join("build-42.json");
        assert!(trace.is_file());

        let content = std::fs::read_to_string(trace).unwrap();
        assert!(content.contains(r#""name": "stuff""#));
    }

    #[test]
    fn resolve_duplicate_reference_lists_once() {
        let home = TempDir::new().unwrap();
        write_fixed_library_config(&home, "stuff");

        let output = shelf(&home)
            .args([
                "resolve", "stuff", "stuff", "--format", "plain", "--no-trace",
            ])
            .assert()
            .success();

        let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
        assert_eq!(stdout.matches("LibraryRecord{name=stuff").count(), 1);
    }

    #[test]
    fn resolve_adhoc_retriever_is_untrusted() {
        let home = TempDir::new().unwrap();
        let tree = home.path().join("adhoc-lib");
        let vars = tree.join("vars");
        std::fs::create_dir_all(&vars).unwrap();
        std::fs::write(vars.join("x.src"), "def call() { }").unwrap();

        let spec = format!(
            r#"{{"type":"fixed","path":"{}","version":"master"}}"#,
            tree.display()
        );
        shelf(&home)
            .args([
                "resolve",
                "otherstuff",
                "--retriever",
                &spec,
                "--format",
                "plain",
                "--no-trace",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "LibraryRecord{name=otherstuff, version=master, variables=[x], trusted=false}",
            ));
    }

    #[test]
    fn local_scope_contributes_untrusted_library() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        let tree = home.path().join("libsrc").join("local-lib");
        let vars = tree.join("vars");
        std::fs::create_dir_all(&vars).unwrap();
        std::fs::write(vars.join("x.src"), "def call() { }").unwrap();

        let local = format!(
            r#"
[[library]]
name = "local-lib"
[library.retriever]
type = "fixed"
path = "{}"
"#,
            tree.display()
        );
        std::fs::write(project.path().join(".shelf.toml"), local).unwrap();

        let mut cmd = cargo_bin_cmd!("shelf");
        cmd.env("HOME", home.path())
            .env("XDG_CONFIG_HOME", home.path().join("config"))
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env("XDG_CACHE_HOME", home.path().join("cache"))
            .env("XDG_DATA_HOME", home.path().join("data"))
            .current_dir(project.path());

        cmd.args(["resolve", "local-lib", "--format", "plain", "--no-trace"])
            .assert()
            .success()
            .stdout(predicate::str::contains("trusted=false"));
    }

    #[test]
    fn completions_generate() {
        let home = TempDir::new().unwrap();
        shelf(&home)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("shelf"));
    }
}

mod engine_tests {
    use serial_test::serial;
    use shelf::cache::CacheManager;
    use shelf::config::{CacheConfig, ConfigManager, LibraryDecl, RefreshPolicy, VersionConflictPolicy};
    use shelf::error::ShelfError;
    use shelf::namespace::AccessContext;
    use shelf::registry::{ConfigurationRegistry, LibraryConfiguration, Scope, ScopeChain};
    use shelf::resolver::{LibraryReference, Resolver};
    use shelf::retrieve::RetrieverSpec;
    use shelf::session::{SessionId, SessionRecordStore};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Build a pinned library tree with a `vars/x` callable and a class
    /// under the given package path
    fn library_tree(root: &Path, package: &[&str], class: &str) {
        let vars = root.join("vars");
        std::fs::create_dir_all(&vars).unwrap();
        std::fs::write(vars.join("x.src"), "def call() { }").unwrap();

        let mut pkg = root.join("src");
        for segment in package {
            pkg = pkg.join(segment);
        }
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join(format!("{class}.src")), "class m { }").unwrap();
    }

    fn fixed_decl(name: &str, path: &Path) -> LibraryDecl {
        LibraryDecl {
            name: name.to_string(),
            retriever: RetrieverSpec::Fixed {
                path: path.to_path_buf(),
                version: Some("master".to_string()),
            },
            default_version: Some("master".to_string()),
            allow_version_override: true,
            implicit: false,
        }
    }

    fn engine(cache_root: &Path) -> (Arc<ConfigurationRegistry>, Resolver) {
        let registry = Arc::new(ConfigurationRegistry::new());
        let cache_config = CacheConfig {
            refresh: RefreshPolicy::Never,
            max_age_secs: 300,
            gc_days: 30,
        };
        let cache = Arc::new(CacheManager::new(cache_root.to_path_buf(), &cache_config));
        let store = Arc::new(SessionRecordStore::new());
        let resolver = Resolver::new(
            Arc::clone(&registry),
            cache,
            store,
            VersionConflictPolicy::FirstWins,
        );
        (registry, resolver)
    }

    #[tokio::test]
    async fn classes_from_wrong_place_are_denied() {
        let cache_root = TempDir::new().unwrap();
        let stuff_src = TempDir::new().unwrap();
        let stuph_src = TempDir::new().unwrap();
        library_tree(stuff_src.path(), &["some", "pkg"], "Lib");
        library_tree(stuph_src.path(), &["other", "pkg"], "Lib");

        let (registry, resolver) = engine(cache_root.path());
        registry
            .register(
                Scope::Global,
                LibraryConfiguration::from_decl(&fixed_decl("stuff", stuff_src.path())),
            )
            .unwrap();
        registry
            .register(
                Scope::Global,
                LibraryConfiguration::from_decl(&fixed_decl("stuph", stuph_src.path())),
            )
            .unwrap();

        let session = SessionId::new();
        let chain = ScopeChain::global();

        // Each library reaches its own classes.
        let stuff = resolver
            .resolve(&session, &chain, &LibraryReference::parse("stuff@master").unwrap())
            .await
            .unwrap();
        assert!(stuff
            .namespace
            .class(&AccessContext::Session, "some.pkg.Lib")
            .is_ok());

        // Dispatching against a library the session never referenced
        // fails as an unknown library, not a silent no-op.
        let err = resolver
            .store()
            .require(&session, "stuph")
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::UnknownLibrary(_)));

        // With both loaded, stuff's code reaching into stuph's internals
        // is denied with the offending symbol identified.
        let stuph = resolver
            .resolve(&session, &chain, &LibraryReference::parse("stuph@master").unwrap())
            .await
            .unwrap();

        let err = stuph
            .namespace
            .class(&stuff.namespace.context(), "other.pkg.Lib")
            .unwrap_err();
        match err {
            ShelfError::CrossLibraryAccessDenied { symbol, target, caller } => {
                assert_eq!(symbol, "other.pkg.Lib");
                assert_eq!(target, "stuph");
                assert_eq!(caller, "stuff");
            }
            other => panic!("expected CrossLibraryAccessDenied, got {other}"),
        }

        // And symmetrically for stuph reaching into stuff.
        assert!(stuff
            .namespace
            .class(&stuph.namespace.context(), "some.pkg.Lib")
            .is_err());

        // A value the session obtained from stuph is freestanding.
        let escaped = stuph
            .namespace
            .class(&AccessContext::Session, "other.pkg.Lib")
            .unwrap();
        assert_eq!(escaped.library, "stuph");
    }

    #[tokio::test]
    async fn decl_roundtrip_resolves_identically() {
        let cache_root = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        library_tree(src.path(), &["some", "pkg"], "Lib");

        let decl = fixed_decl("stuff", src.path());
        let toml = toml::to_string(&decl).unwrap();
        let reparsed: LibraryDecl = toml::from_str(&toml).unwrap();
        assert_eq!(reparsed, decl);

        let (registry, resolver) = engine(cache_root.path());
        registry
            .register(Scope::Global, LibraryConfiguration::from_decl(&decl))
            .unwrap();

        let original = resolver
            .resolve(
                &SessionId::new(),
                &ScopeChain::global(),
                &LibraryReference::parse("stuff").unwrap(),
            )
            .await
            .unwrap();

        let (registry2, resolver2) = engine(cache_root.path());
        registry2
            .register(Scope::Global, LibraryConfiguration::from_decl(&reparsed))
            .unwrap();

        let roundtripped = resolver2
            .resolve(
                &SessionId::new(),
                &ScopeChain::global(),
                &LibraryReference::parse("stuff").unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(roundtripped.record, original.record);
    }

    #[tokio::test]
    async fn folder_scope_shadows_global_and_drops_trust() {
        let cache_root = TempDir::new().unwrap();
        let global_src = TempDir::new().unwrap();
        let folder_src = TempDir::new().unwrap();
        library_tree(global_src.path(), &["some", "pkg"], "Lib");
        library_tree(folder_src.path(), &["some", "pkg"], "Lib");

        let (registry, resolver) = engine(cache_root.path());
        registry
            .register(
                Scope::Global,
                LibraryConfiguration::from_decl(&fixed_decl("stuff", global_src.path())),
            )
            .unwrap();
        registry
            .register(
                Scope::Folder("team-a".to_string()),
                LibraryConfiguration::from_decl(&fixed_decl("stuff", folder_src.path())),
            )
            .unwrap();

        // From inside the folder, the folder's declaration wins and is
        // untrusted.
        let chain = ScopeChain::new(vec!["team-a".to_string()]);
        let shadowed = resolver
            .resolve(&SessionId::new(), &chain, &LibraryReference::parse("stuff").unwrap())
            .await
            .unwrap();
        assert!(!shadowed.record.trusted);

        // From outside, the global declaration is used and trusted.
        let global = resolver
            .resolve(
                &SessionId::new(),
                &ScopeChain::global(),
                &LibraryReference::parse("stuff").unwrap(),
            )
            .await
            .unwrap();
        assert!(global.record.trusted);
    }

    #[tokio::test]
    async fn replay_produces_identical_trace() {
        let cache_root = TempDir::new().unwrap();
        let stuff_src = TempDir::new().unwrap();
        let stuph_src = TempDir::new().unwrap();
        library_tree(stuff_src.path(), &["some", "pkg"], "Lib");
        library_tree(stuph_src.path(), &["other", "pkg"], "Lib");

        let (registry, resolver) = engine(cache_root.path());
        registry
            .register(
                Scope::Global,
                LibraryConfiguration::from_decl(&fixed_decl("stuff", stuff_src.path())),
            )
            .unwrap();
        registry
            .register(
                Scope::Global,
                LibraryConfiguration::from_decl(&fixed_decl("stuph", stuph_src.path())),
            )
            .unwrap();

        let chain = ScopeChain::global();
        let mut traces = vec![];
        for _ in 0..2 {
            let session = SessionId::new();
            for name in ["stuph", "stuff"] {
                resolver
                    .resolve(&session, &chain, &LibraryReference::parse(name).unwrap())
                    .await
                    .unwrap();
            }
            traces.push(resolver.store().end(&session).await);
        }

        assert_eq!(traces[0], traces[1]);
        let names: Vec<_> = traces[0].iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["stuph", "stuff"]);
    }

    #[tokio::test]
    async fn scm_retriever_end_to_end() {
        // Exercises the git-backed retriever against a local repository;
        // skipped when git is unavailable.
        if std::process::Command::new("git").arg("--version").output().is_err() {
            return;
        }

        let repo = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .args(args)
                .current_dir(repo.path())
                .env("GIT_AUTHOR_NAME", "t")
                .env("GIT_AUTHOR_EMAIL", "t@t")
                .env("GIT_COMMITTER_NAME", "t")
                .env("GIT_COMMITTER_EMAIL", "t@t")
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?} failed");
        };
        run(&["init", "-q", "-b", "master"]);
        library_tree(repo.path(), &["some", "pkg"], "Lib");
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);

        let cache_root = TempDir::new().unwrap();
        let (registry, resolver) = engine(cache_root.path());
        let decl = LibraryDecl {
            name: "stuff".to_string(),
            retriever: RetrieverSpec::Scm {
                remote: repo.path().to_string_lossy().to_string(),
            },
            default_version: Some("master".to_string()),
            allow_version_override: true,
            implicit: false,
        };
        registry
            .register(Scope::Global, LibraryConfiguration::from_decl(&decl))
            .unwrap();

        let session = SessionId::new();
        let loaded = resolver
            .resolve(
                &session,
                &ScopeChain::global(),
                &LibraryReference::parse("stuff@master").unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            loaded.record.to_string(),
            "LibraryRecord{name=stuff, version=master, variables=[x], trusted=true}"
        );
        assert!(loaded.tree.join("vars").join("x.src").is_file());

        // A branch that does not exist upstream fails clearly.
        let err = resolver
            .resolve(
                &session,
                &ScopeChain::global(),
                &LibraryReference::parse("nope@missing-branch").unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::UnknownLibrary(_)));

        let err = resolver
            .resolve(
                &SessionId::new(),
                &ScopeChain::global(),
                &LibraryReference::parse("stuff@missing-branch").unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::VersionNotFound { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn state_dirs_follow_xdg_environment() {
        let temp = TempDir::new().unwrap();
        let old_state = std::env::var_os("XDG_STATE_HOME");
        let old_cache = std::env::var_os("XDG_CACHE_HOME");
        std::env::set_var("XDG_STATE_HOME", temp.path());
        std::env::set_var("XDG_CACHE_HOME", temp.path());

        let sessions = ConfigManager::sessions_dir();
        assert!(sessions.starts_with(temp.path()));
        assert!(ConfigManager::cache_dir().starts_with(temp.path()));

        ConfigManager::ensure_state_dirs().await.unwrap();
        assert!(sessions.is_dir());

        match old_state {
            Some(v) => std::env::set_var("XDG_STATE_HOME", v),
            None => std::env::remove_var("XDG_STATE_HOME"),
        }
        match old_cache {
            Some(v) => std::env::set_var("XDG_CACHE_HOME", v),
            None => std::env::remove_var("XDG_CACHE_HOME"),
        }
    }

    #[tokio::test]
    #[serial]
    async fn trace_persists_under_state_dir() {
        let temp = TempDir::new().unwrap();
        let old_state = std::env::var_os("XDG_STATE_HOME");
        std::env::set_var("XDG_STATE_HOME", temp.path());

        let cache_root = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        library_tree(src.path(), &["some", "pkg"], "Lib");

        let (registry, resolver) = engine(cache_root.path());
        registry
            .register(
                Scope::Global,
                LibraryConfiguration::from_decl(&fixed_decl("stuff", src.path())),
            )
            .unwrap();

        let session = SessionId::named("replayed-build");
        resolver
            .resolve(
                &session,
                &ScopeChain::global(),
                &LibraryReference::parse("stuff").unwrap(),
            )
            .await
            .unwrap();

        let path = resolver
            .store()
            .persist_trace(&session, &ConfigManager::sessions_dir())
            .await
            .unwrap();
        assert!(path.starts_with(temp.path()));
        assert!(path.is_file());

        match old_state {
            Some(v) => std::env::set_var("XDG_STATE_HOME", v),
            None => std::env::remove_var("XDG_STATE_HOME"),
        }
    }
}
