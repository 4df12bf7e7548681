//! Replaying a plan onto a snapshot.

use log::{debug, trace};

use super::{
    super::{
        device::DeviceDetails,
        error::{pretty_device, DevicegraphError},
        graph::Devicegraph,
    },
    ActionKind, Actiongraph,
};

impl Devicegraph {
    /// Applies every action of the plan, in order.
    ///
    /// The actions run on a copy that replaces this snapshot only when all
    /// of them succeeded and the result passes `check()`.
    pub fn apply_actions(&mut self, plan: &Actiongraph) -> Result<(), DevicegraphError> {
        let mut working = self.duplicate();
        for action in plan {
            trace!("Applying: {}", action.description);
            working.apply_action(&action.kind)?;
        }

        working.check()?;
        debug!("Applied {} action(s)", plan.len());
        *self = working;
        Ok(())
    }

    fn apply_action(&mut self, action: &ActionKind) -> Result<(), DevicegraphError> {
        match action {
            ActionKind::Create { device, parents } => {
                self.insert_device(device.clone())?;
                for (parent, kind) in parents {
                    self.add_edge(*parent, device.sid(), *kind)?;
                }
            }
            ActionKind::Delete { device } => {
                self.remove_device_node(*device)?;
            }
            ActionKind::Resize { device, to, .. } => self.resize(*device, *to)?,
            ActionKind::Reformat { device, to, .. } => {
                let idx = self.require(*device)?;
                let target = &mut self.inner[idx];
                match &mut target.details {
                    DeviceDetails::BlkFilesystem { fs_type, .. } => *fs_type = *to,
                    _ => {
                        return Err(DevicegraphError::unsupported(
                            pretty_device(target),
                            "reformat",
                        ))
                    }
                }
            }
            ActionKind::SetMountPoint { device, to, .. } => {
                self.set_mount_point(*device, to.as_deref())?
            }
            ActionKind::Rename { device, to, .. } => {
                let idx = self.require(*device)?;
                self.inner[idx].name = to.clone();
            }
            ActionKind::Reconfigure { device, details } => {
                let idx = self.require(*device)?;
                let target = &mut self.inner[idx];
                if target.kind() != details.kind() {
                    return Err(DevicegraphError::invalid_argument(
                        pretty_device(target),
                        format!("cannot turn a {} into a {}", target.kind(), details.kind()),
                    ));
                }
                target.details = details.clone();
            }
            ActionKind::Attach {
                parent,
                child,
                kind,
            } => self.add_edge(*parent, *child, *kind)?,
            ActionKind::Detach { parent, child, .. } => {
                self.remove_edge(*parent, *child)?;
            }
        }

        Ok(())
    }
}
