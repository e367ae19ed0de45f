use crate::core::domain::value_object::{NodeName, PoolName, VmId};

/// Addresses one QEMU guest in the cluster. A reconcile call owns its
/// `VmRef` exclusively; the node is rewritten when a migration moves the
/// guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRef {
    vm_id: VmId,
    node: NodeName,
    pool: Option<PoolName>,
}

impl VmRef {
    pub fn new(vm_id: VmId, node: NodeName) -> Self {
        Self {
            vm_id,
            node,
            pool: None,
        }
    }

    pub fn vm_id(&self) -> VmId {
        self.vm_id
    }

    pub fn node(&self) -> &NodeName {
        &self.node
    }

    pub fn pool(&self) -> Option<&PoolName> {
        self.pool.as_ref()
    }

    pub fn set_node(&mut self, node: NodeName) {
        self.node = node;
    }

    pub(crate) fn set_pool(&mut self, pool: Option<PoolName>) {
        self.pool = pool;
    }

    /// Base API path of this guest.
    pub(crate) fn qemu_path(&self) -> String {
        format!("nodes/{}/qemu/{}", self.node.as_str(), self.vm_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::value_object::{NodeName, VmId};

    #[test]
    fn test_qemu_path() {
        let vmr = VmRef::new(VmId::new_unchecked(100), NodeName::new_unchecked("pve1"));
        assert_eq!(vmr.qemu_path(), "nodes/pve1/qemu/100");
    }
}
