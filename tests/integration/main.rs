//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// `kiln` with an isolated config file and workdir under `temp`
    fn kiln(temp: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("kiln");
        cmd.env("KILN_CONFIG", temp.join("config.toml"))
            .env("KILN_NON_INTERACTIVE", "1");
        cmd
    }

    fn write(path: &Path, content: impl AsRef<[u8]>) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn config_with_cache(temp: &Path, extra: &str) {
        let cache = temp.join("cache");
        let workdir = temp.join("work");
        write(
            &temp.join("config.toml"),
            format!(
                "[general]\nworkdir = {:?}\n\n[cache]\nread_from = [{:?}]\nwrite_to = [{:?}]\n\n{}",
                workdir.display().to_string(),
                cache.display().to_string(),
                cache.display().to_string(),
                extra
            ),
        );
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental JVM compiler driver"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn config_path_follows_env() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_uses_defaults() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("nailgun-server-0.9.1.jar"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(temp.path().join("config.toml").exists());

        kiln(temp.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Use --force to overwrite"));
    }

    #[test]
    fn invalid_config_names_the_file() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("config.toml"), "[compile\n");
        kiln(temp.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration at"));
    }

    #[test]
    fn analyze_prints_debug_view() {
        let temp = TempDir::new().unwrap();
        let record = temp.path().join("Hello.json");
        write(
            &record,
            r#"{"declaredPackage": "org.pantsbuild.example",
                "imports": [{"name": "java.util.*", "isStatic": false, "isAsterisk": true}],
                "topLevelTypes": ["Hello"],
                "consumedUnqualifiedTypes": ["List"]}"#,
        );

        kiln(temp.path())
            .arg("analyze")
            .arg(&record)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"declared_package\": \"org.pantsbuild.example\""))
            .stdout(predicate::str::contains("\"is_asterisk\": true"));
    }

    #[test]
    fn analyze_rejects_missing_keys() {
        let temp = TempDir::new().unwrap();
        let record = temp.path().join("Broken.json");
        write(&record, r#"{"declaredPackage": null, "imports": []}"#);

        kiln(temp.path())
            .arg("analyze")
            .arg(&record)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Malformed dependency analysis"));
    }

    fn lockfile_for(temp: &Path, pinned: &[u8]) -> std::path::PathBuf {
        use sha2::{Digest, Sha256};
        let path = temp.join("coursier.lock.json");
        let lockfile = serde_json::json!({
            "entries": [{
                "coord": "junit:junit:4.13.2",
                "file_name": "junit-4.13.2.jar",
                "direct_dependencies": [],
                "dependencies": [],
                "file_digest": {
                    "fingerprint": hex::encode(Sha256::digest(pinned)),
                    "serialized_bytes_length": pinned.len(),
                },
            }]
        });
        write(&path, serde_json::to_vec_pretty(&lockfile).unwrap());
        path
    }

    #[test]
    fn lockfile_verify_accepts_pinned_jar() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("jars/junit-4.13.2.jar"), b"junit");
        let lockfile = lockfile_for(temp.path(), b"junit");

        kiln(temp.path())
            .args(["lockfile", "verify"])
            .arg(&lockfile)
            .arg("--dir")
            .arg(temp.path().join("jars"))
            .assert()
            .success()
            .stdout(predicate::str::contains("1 artifact(s) verified"));
    }

    #[test]
    fn lockfile_verify_rejects_tampered_jar() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("jars/junit-4.13.2.jar"), b"tampered");
        let lockfile = lockfile_for(temp.path(), b"junit");

        kiln(temp.path())
            .args(["lockfile", "verify"])
            .arg(&lockfile)
            .arg("--dir")
            .arg(temp.path().join("jars"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Integrity violation for junit:junit:4.13.2"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        config_with_cache(temp.path(), "");
        kiln(temp.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries found."));
    }

    #[test]
    fn compile_rejects_unknown_option_set() {
        let temp = TempDir::new().unwrap();
        config_with_cache(temp.path(), "[compile]\ndefault_compiler_option_sets = [\"profile\"]\n");
        write(&temp.path().join("units.json"), "[]");

        kiln(temp.path())
            .arg("compile")
            .arg(temp.path().join("units.json"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration error"))
            .stderr(predicate::str::contains("profile"));
    }

    #[test]
    fn compile_rejects_dependency_cycle() {
        let temp = TempDir::new().unwrap();
        config_with_cache(temp.path(), "");
        write(
            &temp.path().join("units.json"),
            r#"[{"name": "a", "sources": [], "dependencies": ["b"]},
                {"name": "b", "sources": [], "dependencies": ["a"]}]"#,
        );

        kiln(temp.path())
            .arg("compile")
            .arg(temp.path().join("units.json"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Dependency cycle detected: a -> b -> a"));
    }

    #[cfg(unix)]
    mod fake_jdk {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        const SERVER_JAR: &[u8] = b"fake compiler server";

        fn executable(path: &Path, script: &str) {
            write(path, script);
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        /// A JDK whose `java` copies each `.java` argument to `classes/<stem>.class`
        fn project(temp: &Path) {
            use sha2::{Digest, Sha256};

            let jdk = temp.join("jdk");
            executable(
                &jdk.join("bin/java"),
                "#!/bin/sh\n\
                 if [ \"$1\" = \"-version\" ]; then echo 'openjdk version \"17.0.2\"' >&2; exit 0; fi\n\
                 mkdir -p classes\n\
                 for arg in \"$@\"; do\n\
                   case \"$arg\" in\n\
                     *.java) cp \"$arg\" \"classes/$(basename \"$arg\" .java).class\" ;;\n\
                   esac\n\
                 done\n",
            );
            executable(
                &temp.join("bin/locator"),
                &format!("#!/bin/sh\necho {}\n", jdk.display()),
            );
            write(&temp.join("jars/fake-server-1.0.jar"), SERVER_JAR);

            config_with_cache(
                temp,
                &format!(
                    "[jdk]\nlocator_exe = {:?}\n\n\
                     [jdk.persistent_server]\n\
                     coord = \"com.example:fake-server:1.0\"\n\
                     file_name = \"fake-server-1.0.jar\"\n\n\
                     [jdk.persistent_server.file_digest]\n\
                     fingerprint = \"{}\"\n\
                     serialized_bytes_length = {}\n",
                    temp.join("bin/locator").display().to_string(),
                    hex::encode(Sha256::digest(SERVER_JAR)),
                    SERVER_JAR.len()
                ),
            );

            write(&temp.join("src/org/lib/A.java"), "package org.lib;\npublic class A {}\n");
            write(&temp.join("src/org/app/B.java"), "package org.app;\npublic class B {}\n");
            write(
                &temp.join("units.json"),
                r#"[{"name": "app", "sources": ["src/org/app/B.java"], "dependencies": ["lib"]},
                    {"name": "lib", "sources": ["src/org/lib/A.java"]}]"#,
            );
        }

        #[test]
        fn compile_then_reuse_cache() {
            let temp = TempDir::new().unwrap();
            project(temp.path());

            kiln(temp.path())
                .arg("compile")
                .arg(temp.path().join("units.json"))
                .arg("--jars")
                .arg(temp.path().join("jars"))
                .arg("--report-diagnostic-counts")
                .assert()
                .success()
                .stdout(predicate::str::contains("isolation-mixed-pool-bootstrap"))
                .stdout(predicate::str::contains("Reporting number of diagnostics for: lib"))
                .stdout(predicate::str::contains("Warning: 0"))
                .stdout(predicate::str::contains("app (compiled)"));

            let latest = temp.path().join("work/run-tracker/latest/info");
            let info = std::fs::read_to_string(latest).unwrap();
            assert!(info.contains("target_data: {"));
            assert!(info.contains("diagnostic_counts"));

            kiln(temp.path())
                .arg("compile")
                .arg(temp.path().join("units.json"))
                .arg("--jars")
                .arg(temp.path().join("jars"))
                .assert()
                .success()
                .stdout(predicate::str::contains("app cached"))
                .stdout(predicate::str::contains("lib cached"));

            kiln(temp.path())
                .args(["cache", "list", "--format", "plain"])
                .assert()
                .success()
                .stdout(predicate::str::is_match("(?m)^[0-9a-f]{64}$").unwrap());
        }

        #[test]
        fn hermetic_strategy_never_bootstraps() {
            let temp = TempDir::new().unwrap();
            project(temp.path());

            kiln(temp.path())
                .arg("compile")
                .arg(temp.path().join("units.json"))
                .arg("--jars")
                .arg(temp.path().join("jars"))
                .args(["--strategy", "hermetic"])
                .assert()
                .success()
                .stdout(predicate::str::contains("isolation-mixed-pool-bootstrap").not());
        }

        #[test]
        fn missing_jdk_surfaces_locator_stderr() {
            let temp = TempDir::new().unwrap();
            project(temp.path());
            executable(
                &temp.path().join("bin/locator"),
                "#!/bin/sh\necho 'no JVM found for --system-jvm' >&2\nexit 1\n",
            );

            kiln(temp.path())
                .arg("compile")
                .arg(temp.path().join("units.json"))
                .arg("--jars")
                .arg(temp.path().join("jars"))
                .assert()
                .failure()
                .stdout(predicate::str::contains("no JVM found for --system-jvm"));
        }
    }
}
