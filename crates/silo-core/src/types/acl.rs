//! Access Control List (ACL) types
//!
//! ACLs are stored and served back, not enforced. Canned ACLs expand at
//! store time to explicit grant lists against the fixed S3 group URIs.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::common::Owner;

/// AllUsers group URI
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
/// AuthenticatedUsers group URI
pub const AUTHENTICATED_USERS_URI: &str =
    "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

/// Canned (predefined) ACL names accepted in the `x-amz-acl` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    /// Owner gets FULL_CONTROL. No one else has access rights.
    #[default]
    Private,
    /// Owner gets FULL_CONTROL. Everyone else gets READ.
    PublicRead,
    /// Owner gets FULL_CONTROL. Everyone else gets READ and WRITE.
    PublicReadWrite,
    /// Owner gets FULL_CONTROL. Authenticated users get READ.
    AuthenticatedRead,
    /// Object owner gets FULL_CONTROL. Bucket owner gets READ.
    BucketOwnerRead,
    /// Both object owner and bucket owner get FULL_CONTROL.
    BucketOwnerFullControl,
}

impl FromStr for CannedAcl {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(CannedAcl::Private),
            "public-read" => Ok(CannedAcl::PublicRead),
            "public-read-write" => Ok(CannedAcl::PublicReadWrite),
            "authenticated-read" => Ok(CannedAcl::AuthenticatedRead),
            "bucket-owner-read" => Ok(CannedAcl::BucketOwnerRead),
            "bucket-owner-full-control" => Ok(CannedAcl::BucketOwnerFullControl),
            _ => Err(crate::Error::InvalidArgument(format!(
                "Invalid canned ACL: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Read,
    Write,
    ReadAcp,
    WriteAcp,
    FullControl,
}

impl FromStr for Permission {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READ" => Ok(Permission::Read),
            "WRITE" => Ok(Permission::Write),
            "READ_ACP" => Ok(Permission::ReadAcp),
            "WRITE_ACP" => Ok(Permission::WriteAcp),
            "FULL_CONTROL" => Ok(Permission::FullControl),
            _ => Err(crate::Error::InvalidArgument(format!(
                "Invalid permission: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::ReadAcp => "READ_ACP",
            Permission::WriteAcp => "WRITE_ACP",
            Permission::FullControl => "FULL_CONTROL",
        };
        f.write_str(s)
    }
}

/// Who receives a grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum Grantee {
    CanonicalUser {
        id: String,
        display_name: Option<String>,
    },
    AmazonCustomerByEmail {
        email_address: String,
    },
    Group {
        uri: String,
    },
}

impl Grantee {
    pub fn canonical_user(id: impl Into<String>) -> Self {
        Grantee::CanonicalUser {
            id: id.into(),
            display_name: None,
        }
    }

    pub fn all_users() -> Self {
        Grantee::Group {
            uri: ALL_USERS_URI.to_string(),
        }
    }

    pub fn authenticated_users() -> Self {
        Grantee::Group {
            uri: AUTHENTICATED_USERS_URI.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}

impl Grant {
    pub fn new(grantee: Grantee, permission: Permission) -> Self {
        Self {
            grantee,
            permission,
        }
    }
}

/// Owner plus grant list, as stored and served
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlList {
    pub owner: Owner,
    pub grants: Vec<Grant>,
}

impl AccessControlList {
    /// The default ACL when none has been stored: owner FULL_CONTROL.
    pub fn default_for(owner: Owner) -> Self {
        Self::from_canned(owner, CannedAcl::Private)
    }

    /// Expand a canned ACL into explicit grants. The server has a single
    /// credential pair, so bucket-owner-read and bucket-owner-full-control
    /// collapse onto the same owner grant.
    pub fn from_canned(owner: Owner, canned: CannedAcl) -> Self {
        let owner_grant = Grant::new(
            Grantee::CanonicalUser {
                id: owner.id.clone(),
                display_name: Some(owner.display_name.clone()),
            },
            Permission::FullControl,
        );

        let mut grants = vec![owner_grant];
        match canned {
            CannedAcl::Private => {}
            CannedAcl::PublicRead => {
                grants.push(Grant::new(Grantee::all_users(), Permission::Read));
            }
            CannedAcl::PublicReadWrite => {
                grants.push(Grant::new(Grantee::all_users(), Permission::Read));
                grants.push(Grant::new(Grantee::all_users(), Permission::Write));
            }
            CannedAcl::AuthenticatedRead => {
                grants.push(Grant::new(
                    Grantee::authenticated_users(),
                    Permission::Read,
                ));
            }
            CannedAcl::BucketOwnerRead => {
                grants.push(Grant::new(
                    Grantee::canonical_user(owner.id.clone()),
                    Permission::Read,
                ));
            }
            CannedAcl::BucketOwnerFullControl => {
                grants.push(Grant::new(
                    Grantee::canonical_user(owner.id.clone()),
                    Permission::FullControl,
                ));
            }
        }

        Self { owner, grants }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_acl_parsing() {
        assert_eq!(CannedAcl::from_str("private").unwrap(), CannedAcl::Private);
        assert_eq!(
            CannedAcl::from_str("public-read").unwrap(),
            CannedAcl::PublicRead
        );
        assert!(CannedAcl::from_str("PRIVATE").is_err());
    }

    #[test]
    fn test_public_read_expansion() {
        let acl = AccessControlList::from_canned(Owner::new("silo"), CannedAcl::PublicRead);
        assert_eq!(acl.grants.len(), 2);
        assert_eq!(acl.grants[0].permission, Permission::FullControl);
        assert_eq!(
            acl.grants[1],
            Grant::new(Grantee::all_users(), Permission::Read)
        );
    }

    #[test]
    fn test_authenticated_read_expansion() {
        let acl =
            AccessControlList::from_canned(Owner::new("silo"), CannedAcl::AuthenticatedRead);
        assert!(matches!(
            &acl.grants[1].grantee,
            Grantee::Group { uri } if uri == AUTHENTICATED_USERS_URI
        ));
    }

    #[test]
    fn test_default_acl_is_private() {
        let acl = AccessControlList::default_for(Owner::new("silo"));
        assert_eq!(acl.grants.len(), 1);
        assert_eq!(acl.grants[0].permission, Permission::FullControl);
    }
}
