use alloy::primitives::{Address, Bytes};

/// EIP-7702 delegation designator prefix
pub const EIP_7702_DELEGATION_PREFIX: [u8; 3] = [0xef, 0x01, 0x00];

/// EIP-7702 delegation code length (prefix + address)
pub const EIP_7702_DELEGATION_CODE_LENGTH: usize = 23;

/// What the code at an EOA says about its EIP-7702 upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationStatus {
    /// Plain EOA; the wallet must upgrade it before atomic batches.
    NotDelegated,
    Delegated { target: Address },
    /// Ordinary contract code, not a delegation designator.
    Contract,
}

impl DelegationStatus {
    pub fn from_code(code: &Bytes) -> Self {
        if code.is_empty() {
            return DelegationStatus::NotDelegated;
        }

        if code.len() != EIP_7702_DELEGATION_CODE_LENGTH
            || !code.starts_with(&EIP_7702_DELEGATION_PREFIX)
        {
            return DelegationStatus::Contract;
        }

        DelegationStatus::Delegated {
            target: Address::from_slice(&code[3..23]),
        }
    }

    pub fn target(&self) -> Option<Address> {
        match self {
            DelegationStatus::Delegated { target } => Some(*target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, bytes};

    #[test]
    fn designator_yields_target() {
        let code = bytes!("0xef010063c0c19a282a1b52b07dd5a65b58948a07dae32b");
        assert_eq!(
            DelegationStatus::from_code(&code),
            DelegationStatus::Delegated {
                target: address!("0x63c0c19a282a1b52b07dd5a65b58948a07dae32b")
            }
        );
    }

    #[test]
    fn empty_and_contract_code() {
        assert_eq!(
            DelegationStatus::from_code(&Bytes::new()),
            DelegationStatus::NotDelegated
        );
        assert_eq!(
            DelegationStatus::from_code(&bytes!("0x6080604052")),
            DelegationStatus::Contract
        );
        assert_eq!(DelegationStatus::from_code(&bytes!("0x6080")).target(), None);
    }
}
