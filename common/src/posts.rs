use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// row shapes as returned by the backend views, ids are uuids kept as text

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub profile_image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub location_name: Option<String>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub is_pickup: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PostWithUser {
    #[serde(flatten)]
    pub post: Post,
    pub username: String,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub is_liked_by_current_user: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CommentWithUser {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub username: String,
    pub profile_image_url: Option<String>,
}

/// Image references carried by a backend row, in the order a surface draws them.
pub trait ImageReferences {
    fn image_urls(&self) -> Vec<&str>;
}

fn non_blank(url: &Option<String>) -> Option<&str> {
    url.as_deref().filter(|url| !url.trim().is_empty())
}

impl ImageReferences for UserProfile {
    fn image_urls(&self) -> Vec<&str> {
        non_blank(&self.profile_image_url).into_iter().collect()
    }
}

impl ImageReferences for Post {
    fn image_urls(&self) -> Vec<&str> {
        non_blank(&self.image_url).into_iter().collect()
    }
}

impl ImageReferences for PostWithUser {
    fn image_urls(&self) -> Vec<&str> {
        // avatar sits in the header above the photo
        non_blank(&self.profile_image_url)
            .into_iter()
            .chain(self.post.image_urls())
            .collect()
    }
}

impl ImageReferences for CommentWithUser {
    fn image_urls(&self) -> Vec<&str> {
        non_blank(&self.profile_image_url).into_iter().collect()
    }
}

impl<T: ImageReferences> ImageReferences for [T] {
    fn image_urls(&self) -> Vec<&str> {
        self.iter().flat_map(|row| row.image_urls()).collect()
    }
}
