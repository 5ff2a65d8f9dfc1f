//! Discount coupons issued for trails.
//!
//! The catalogue is static sample data; no backend endpoint serves coupons.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use moodwalk_common::timefmt::format_long_date;

use crate::auth::AuthSession;
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: String,
    pub name: String,
    pub description: String,
    pub discount: String,
    pub category: String,
    /// `YYYY-MM-DD`.
    pub valid_until: String,
    pub is_used: bool,
    pub trail_name: String,
    pub issued_at: String,
}

impl Coupon {
    pub fn icon(&self) -> &'static str {
        category_icon(&self.category)
    }

    pub fn status_label(&self) -> &'static str {
        status_label(self.is_used)
    }

    pub fn valid_until_label(&self) -> String {
        format_long_date(&self.valid_until)
    }
}

pub fn category_icon(category: &str) -> &'static str {
    match category {
        "카페" => "☕",
        "식당" => "🍽️",
        "편의점" => "🏪",
        _ => "🎫",
    }
}

pub fn status_label(is_used: bool) -> &'static str {
    if is_used {
        "사용완료"
    } else {
        "사용가능"
    }
}

pub fn sample_coupons() -> Vec<Coupon> {
    let coupon = |id: &str, name: &str, description: &str, discount: &str, category: &str| Coupon {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        discount: discount.into(),
        category: category.into(),
        valid_until: "2024-12-31".into(),
        is_used: false,
        trail_name: "장이소공원".into(),
        issued_at: "2024-01-15".into(),
    };
    vec![
        coupon(
            "coupon_001",
            "한성카페 아메리카노 1000원 할인 쿠폰",
            "아메리카노 구매 시 1000원 할인",
            "1000원",
            "카페",
        ),
        coupon(
            "coupon_002",
            "맛있는 식당 점심 메뉴 2000원 할인",
            "점심 메뉴 주문 시 2000원 할인",
            "2000원",
            "식당",
        ),
    ]
}

/// Coupon announced when a trail is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponOffer {
    pub title: &'static str,
    pub subtitle: &'static str,
    pub coupon_name: &'static str,
    pub trail_label: String,
}

pub fn offer_for(trail_name: &str) -> CouponOffer {
    CouponOffer {
        title: "할인 쿠폰이 발급되었습니다!",
        subtitle: "내 쿠폰에서 확인하세요",
        coupon_name: "한성카페 아메리카노 1000원 할인 쿠폰",
        trail_label: format!("{trail_name} 주변"),
    }
}

pub const LOGIN_REQUIRED: &str = "로그인이 필요한 서비스입니다.";
pub const NO_COUPONS: &str = "아직 발급된 쿠폰이 없습니다";

/// The "my coupons" page.
pub struct CouponBook {
    auth: Arc<AuthSession>,
}

impl CouponBook {
    pub fn new(auth: Arc<AuthSession>) -> Self {
        CouponBook { auth }
    }

    pub fn load(&self) -> Result<Vec<Coupon>, ClientError> {
        if self.auth.current_user().is_none() {
            return Err(ClientError::Validation(LOGIN_REQUIRED.into()));
        }
        Ok(sample_coupons())
    }
}
