//! BLE Service and Characteristic UUIDs.
//!
//! The custom values mirror the peripheral firmware's GATT table and must
//! stay bit-for-bit identical to it.

use uuid::Uuid;

// Standard BLE attributes
/// Client Characteristic Configuration descriptor UUID.
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);
/// Standard Heart Rate Service UUID.
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_00805f9b34fb);
/// Standard Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic UUID.
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_00805f9b34fb);
/// Manufacturer Name characteristic UUID.
pub const MANUFACTURER_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a29_0000_1000_8000_00805f9b34fb);

// LED Control Service
/// LED Control Service UUID.
pub const LED_CONTROL_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x7ac8e949_3d1c_4e1f_8e33_29100625eb06);
/// LED On/Off characteristic UUID (Write).
pub const LED_ON_OFF_UUID: Uuid = Uuid::from_u128(0x30432380_fd30_4543_b0dc_c891606e7551);
/// LED Blink Rate characteristic UUID (Read, Write).
pub const LED_BLINK_RATE_UUID: Uuid = Uuid::from_u128(0x2cba242d_643c_489b_aad9_beea762764aa);
/// LED Duration characteristic UUID (Read, Write).
pub const LED_DURATION_UUID: Uuid = Uuid::from_u128(0x07f15833_d39b_4eb3_a5f8_863fd642a27f);

// Speaker Control Service
/// Speaker Control Service UUID.
pub const SPEAKER_CONTROL_SERVICE_UUID: Uuid =
    Uuid::from_u128(0xb8059629_f548_4f5d_a923_4ee141649921);
/// Speaker On/Off characteristic UUID (Write).
pub const SPEAKER_ON_OFF_UUID: Uuid = Uuid::from_u128(0x2e729421_a4f2_45c6_9cd1_fbb534a77844);
/// Speaker Pitch characteristic UUID (Read, Write).
pub const SPEAKER_PITCH_UUID: Uuid = Uuid::from_u128(0xe5f08409_545b_46e4_84c5_4861f08c0bab);
/// Speaker Volume characteristic UUID (Read, Write).
pub const SPEAKER_VOLUME_UUID: Uuid = Uuid::from_u128(0x32e81b8c_93e5_44ca_884f_bcfc6b1b2d79);

// Disc Statistics Service
/// Disc Statistics Service UUID.
pub const DISC_STATS_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x59ff525b_9e02_495d_83c0_0d1bed2a1c5f);
/// Real-time angular velocity characteristic UUID (Notify).
pub const DISC_ANG_RT_UUID: Uuid = Uuid::from_u128(0x53ef3ae4_50ce_4d56_ba7c_1bf8461fa745);
/// Average angular velocity characteristic UUID (Notify).
pub const DISC_ANG_AVG_UUID: Uuid = Uuid::from_u128(0x2d9b3c66_a3b3_4754_a0fe_a189841ef8c9);
/// Time of flight characteristic UUID (Notify).
pub const DISC_TOF_UUID: Uuid = Uuid::from_u128(0xc344b260_92d9_45fa_992f_f57360dc3d70);
