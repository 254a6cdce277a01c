/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use uuid::Uuid;

// SUOTA / SPOTA service
pub const SPOTA_SERVICE: Uuid = Uuid::from_u128(0x0000fef5_0000_1000_8000_00805f9b34fb);
pub const SPOTA_MEM_DEV: Uuid = Uuid::from_u128(0x8082caa8_41a6_4021_91c6_56f9b954cc34);
pub const SPOTA_GPIO_MAP: Uuid = Uuid::from_u128(0x724249f0_5ec3_4b5f_8804_42345af08651);
pub const SPOTA_MEM_INFO: Uuid = Uuid::from_u128(0x6c53db25_47a1_45fe_a022_7c92fb334fd4);
pub const SPOTA_PATCH_LEN: Uuid = Uuid::from_u128(0x9d84b9a3_000c_49d8_9183_855b673fda31);
pub const SPOTA_PATCH_DATA: Uuid = Uuid::from_u128(0x457871e8_d516_4ca1_9116_57d0b17b9cb2);
pub const SPOTA_SERV_STATUS: Uuid = Uuid::from_u128(0x5f78df94_798c_46f5_990a_b3eb6a065c88);

pub const CLIENT_CONFIG_DESCRIPTOR: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

// SUOTA only
pub const SUOTA_VERSION: Uuid = Uuid::from_u128(0x64b4e8b5_0de5_401b_a21d_acc8db3b913a);
pub const SUOTA_PATCH_DATA_CHAR_SIZE: Uuid =
    Uuid::from_u128(0x42c3dfdd_77be_4d9c_8454_8f875267fb3b);
pub const SUOTA_MTU: Uuid = Uuid::from_u128(0xb7de1eea_823d_43bb_a3af_c4903dfce23c);
pub const SUOTA_L2CAP_PSM: Uuid = Uuid::from_u128(0x61c8849c_f639_4765_946e_5c3419bebb2a);

// Device Information Service
pub const MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const MODEL_NUMBER: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);
pub const FIRMWARE_REVISION: Uuid = Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb);
pub const SOFTWARE_REVISION: Uuid = Uuid::from_u128(0x00002a28_0000_1000_8000_00805f9b34fb);

/// Read in this order during step 0, when present.
pub const DEVICE_INFO_CHARACTERISTICS: &[Uuid] =
    &[MANUFACTURER_NAME, MODEL_NUMBER, FIRMWARE_REVISION, SOFTWARE_REVISION];

pub const SUOTA_INFO_CHARACTERISTICS: &[Uuid] =
    &[SUOTA_VERSION, SUOTA_PATCH_DATA_CHAR_SIZE, SUOTA_MTU, SUOTA_L2CAP_PSM];

/// Characteristics both variants cannot work without.
pub const REQUIRED_CHARACTERISTICS: &[Uuid] = &[
    SPOTA_MEM_DEV,
    SPOTA_GPIO_MAP,
    SPOTA_MEM_INFO,
    SPOTA_PATCH_LEN,
    SPOTA_PATCH_DATA,
    SPOTA_SERV_STATUS,
];
