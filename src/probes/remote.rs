//! Probes for a host reached through a `CommandRunner`, usually an SSH session.
//! Every metric is read from command output.

use async_trait::async_trait;

use super::HostProbes;
use crate::exec::CommandRunner;

/// Probe set that runs every metric as a command on `runner`.
pub struct RemoteHost<R> {
    runner: R,
}

impl<R: CommandRunner> RemoteHost<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn session(&self) -> &R {
        &self.runner
    }
}

#[async_trait]
impl<R: CommandRunner> HostProbes for RemoteHost<R> {
    fn runner(&self) -> &dyn CommandRunner {
        &self.runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::commands;
    use crate::probes::testing::ScriptedRunner;

    #[tokio::test]
    async fn remote_probes_use_commands_for_every_metric() {
        let runner = ScriptedRunner::default()
            .respond(
                &commands::memory(),
                "       total used free\nMem:    200   150   50\n",
            )
            .respond(
                &commands::cpu(),
                "%Cpu(s): 10.0 us,  5.0 sy,  0.0 ni, 85.0 id,  0.0 wa\n",
            )
            .respond(
                &commands::inode(),
                "Filesystem Inodes IUsed IFree IUse% Mounted on\n/dev/vda1 100 7 93 7% /\n",
            );
        let host = RemoteHost::new(runner);

        assert_eq!(host.memory_usage().await.unwrap(), 75.0);
        assert!((host.cpu_usage().await.unwrap() - 15.0).abs() < 1e-9);
        assert_eq!(host.inode_usage().await.unwrap(), 7.0);
        assert_eq!(host.session().called("free"), 1);
        assert_eq!(host.describe(), "scripted");
    }
}
