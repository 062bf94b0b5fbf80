/*!
 * Metric Probes
 *
 * One operation per metric. Command-based probes are shared by every target
 * through default methods; local hosts override the numeric probes with direct
 * OS queries.
 */

pub mod local;
pub mod parse;
pub mod remote;

pub use local::LocalHost;
pub use remote::RemoteHost;

use async_trait::async_trait;

use crate::error::ProbeError;
use crate::exec::{CommandRunner, CommandSpec};

/// Commands issued by the probes, as argument vectors.
pub mod commands {
    use crate::exec::CommandSpec;

    pub fn memory() -> CommandSpec {
        CommandSpec::new("free")
    }

    pub fn cpu() -> CommandSpec {
        CommandSpec::new("top").args(["-b", "-n", "1"])
    }

    pub fn disk() -> CommandSpec {
        CommandSpec::new("df").args(["-P", "/"])
    }

    pub fn inode() -> CommandSpec {
        CommandSpec::new("df").args(["-P", "-i", "/"])
    }

    pub fn file_nr() -> CommandSpec {
        CommandSpec::new("cat").arg("/proc/sys/fs/file-nr")
    }

    pub fn failed_units() -> CommandSpec {
        CommandSpec::new("systemctl").args(["--failed", "--no-legend", "--plain"])
    }

    pub fn service_units() -> CommandSpec {
        CommandSpec::new("systemctl").args([
            "list-units",
            "--type=service",
            "--all",
            "--no-legend",
            "--plain",
        ])
    }

    pub fn journal_tail(unit: &str, lines: usize) -> CommandSpec {
        CommandSpec::new("journalctl")
            .arg("-u")
            .arg(unit)
            .arg("-n")
            .arg(lines.to_string())
            .arg("--no-pager")
    }

    pub fn processes_by_cpu() -> CommandSpec {
        CommandSpec::new("ps").args(["-eo", "pid,user,%cpu,%mem,comm", "--sort=-%cpu"])
    }
}

/// The full probe set for one target host.
#[async_trait]
pub trait HostProbes: Send + Sync {
    /// Runner used by the command-based probes.
    fn runner(&self) -> &dyn CommandRunner;

    /// Label identifying the target in the report.
    fn describe(&self) -> String {
        self.runner().describe()
    }

    async fn memory_usage(&self) -> Result<f64, ProbeError> {
        let out = stdout_of(self.runner(), &commands::memory()).await?;
        parse::parse_free(&out)
    }

    async fn cpu_usage(&self) -> Result<f64, ProbeError> {
        let out = stdout_of(self.runner(), &commands::cpu()).await?;
        parse::parse_top_idle(&out)
    }

    async fn disk_usage(&self) -> Result<f64, ProbeError> {
        let out = stdout_of(self.runner(), &commands::disk()).await?;
        parse::parse_df_percent("disk", &out)
    }

    async fn inode_usage(&self) -> Result<f64, ProbeError> {
        let out = stdout_of(self.runner(), &commands::inode()).await?;
        parse::parse_df_percent("inode", &out)
    }

    async fn fd_usage(&self) -> Result<f64, ProbeError> {
        let out = stdout_of(self.runner(), &commands::file_nr()).await?;
        parse::parse_file_nr(&out)
    }

    async fn failed_services(&self) -> Result<Vec<String>, ProbeError> {
        let out = stdout_of(self.runner(), &commands::failed_units()).await?;
        Ok(parse::parse_unit_names(&out))
    }

    async fn services(&self) -> Result<Vec<String>, ProbeError> {
        let out = stdout_of(self.runner(), &commands::service_units()).await?;
        Ok(parse::parse_unit_names(&out))
    }

    async fn service_logs(&self, unit: &str, lines: usize) -> Result<Vec<String>, ProbeError> {
        let out = stdout_of(self.runner(), &commands::journal_tail(unit, lines)).await?;
        Ok(parse::parse_log_lines(&out))
    }

    async fn top_processes(&self, limit: usize) -> Result<Vec<String>, ProbeError> {
        let out = stdout_of(self.runner(), &commands::processes_by_cpu()).await?;
        Ok(parse::parse_process_rows(&out, limit))
    }
}

async fn stdout_of(runner: &dyn CommandRunner, command: &CommandSpec) -> Result<String, ProbeError> {
    let output = runner.run(command).await?;
    Ok(output.into_stdout(command)?)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn journal_tail_keeps_unit_as_one_argument() {
        let spec = commands::journal_tail("evil.service; reboot", 20);
        assert_eq!(
            spec.arguments(),
            &["-u", "evil.service; reboot", "-n", "20", "--no-pager"]
        );
    }

    #[tokio::test]
    async fn default_probes_parse_runner_output() {
        let runner = ScriptedRunner::default()
            .respond(&commands::disk(), "Filesystem 1024-blocks Used Available Capacity Mounted on\n/dev/vda1 100 42 58 42% /\n")
            .respond(&commands::file_nr(), "512\t0\t1024\n")
            .fail(&commands::failed_units(), 1);
        let host = RemoteHost::new(runner);

        assert_eq!(host.disk_usage().await.unwrap(), 42.0);
        assert_eq!(host.fd_usage().await.unwrap(), 50.0);
        assert!(host.failed_services().await.is_err());
        assert!(host.memory_usage().await.is_err());
    }
}
