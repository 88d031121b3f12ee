pub mod account_share;
pub mod activity;
pub mod dashboard;
pub mod media;
pub mod notification;
pub mod rbac;
pub mod user;

pub use account_share::{AccountShare, AccountShareList, CreateAccountShare, NewAccountShare};
pub use activity::{ActivityEntry, ActivityFilter, NewActivity};
pub use dashboard::DashboardStats;
pub use media::{MediaFolder, MediaItem};
pub use notification::{CreateNotification, NewNotification, Notification, NotificationQuery};
pub use rbac::{
    builtin_permissions, member_permissions, AddMember, CreateGroup, CreatePermission, Group,
    GroupDetail, NewGroup, Permission, SetGroups, SetPermissions, UpdateGroup, UpdatePermission,
};
pub use user::{CreateUser, LoginRequest, NewUser, Session, UpdateUser, User, UserChanges, UserResponse};
